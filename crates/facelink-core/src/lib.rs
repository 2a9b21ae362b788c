pub mod config;
pub mod errors;
pub mod resource;
pub mod types;

pub use config::{CaptureSettings, ClientConfig, RecordingSettings};
pub use errors::{FaceError, FaceLinkError, JobError, TransportError};
pub use resource::{BlobStore, FileBlobStore, MemoryBlobStore, ResourceHandle};
pub use types::*;
