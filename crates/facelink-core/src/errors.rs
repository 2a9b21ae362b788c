use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceLinkError {
    /// Camera or media access denied, no frame, no display surface.
    #[error("Capability unavailable: {reason}")]
    CapabilityUnavailable { reason: String },

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    /// The server answered with an explicit failure flag; `message` is shown verbatim.
    #[error("{message}")]
    Rejected { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Face(#[from] FaceError),

    #[error("Encode failed: {reason}")]
    Encode { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FaceLinkError {
    pub fn capability(reason: impl Into<String>) -> Self {
        Self::CapabilityUnavailable { reason: reason.into() }
    }

    /// Server-side rejection, falling back to `generic` when the server sent no message.
    pub fn rejected(message: Option<String>, generic: &str) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| generic.to_owned());
        Self::Rejected { message }
    }

    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Channel not connected")]
    NotConnected,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("HTTP error: {reason}")]
    Http { reason: String },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// The request did not complete within its deadline.
    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("A video job is already in progress")]
    AlreadyActive,

    /// Non-fatal: resubmit with explicit confirmation to use the default face.
    #[error("No target face selected; confirm to process with the default face")]
    NoTargetSelected,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaceError {
    #[error("Face scan already in progress")]
    ScanInProgress,

    #[error("You must scan faces first")]
    MustScanFirst,

    #[error("Face index {index} is not part of the latest scan")]
    UnknownFaceIndex { index: i64 },

    #[error("No video frame available")]
    NoFrameAvailable,
}
