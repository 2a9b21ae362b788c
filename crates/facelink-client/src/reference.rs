//! Cached mirror of the backend's reference face.

use facelink_core::{FaceLinkError, ReferenceIdentity};
use facelink_transport::ReferenceInfo;
use tracing::{debug, info, warn};
use url::Url;

pub struct ReferenceTracker {
    origin: String,
    identity: ReferenceIdentity,
    refreshing: bool,
}

impl ReferenceTracker {
    pub fn new(origin: impl Into<String>) -> Self {
        let origin = origin.into().trim_end_matches('/').to_owned();
        Self { origin, identity: ReferenceIdentity::default(), refreshing: false }
    }

    pub fn identity(&self) -> &ReferenceIdentity {
        &self.identity
    }

    /// Replace the cache. Thumbnail URLs get a `ts` query so viewers refetch.
    pub fn apply(&mut self, info: ReferenceInfo, now_ms: u64) -> &ReferenceIdentity {
        let thumbnail_url = info
            .thumb
            .filter(|t| !t.is_empty())
            .and_then(|t| self.thumbnail_url(&t, now_ms));
        self.identity = ReferenceIdentity { id: info.id, thumbnail_url };
        info!("Reference identity: {:?}", self.identity.id);
        &self.identity
    }

    fn thumbnail_url(&self, thumb: &str, now_ms: u64) -> Option<String> {
        match Url::parse(&self.origin).and_then(|base| base.join(thumb)) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("ts", &now_ms.to_string());
                Some(url.into())
            }
            Err(e) => {
                warn!("unusable thumbnail path {:?}: {}", thumb, e);
                None
            }
        }
    }

    /// `false` while a refresh is already outstanding.
    pub fn begin_refresh(&mut self) -> bool {
        if self.refreshing {
            return false;
        }
        self.refreshing = true;
        true
    }

    /// Apply a refresh result. Failures keep the stale cache. Returns whether
    /// the identity changed.
    pub fn on_refresh(
        &mut self,
        result: Result<ReferenceInfo, FaceLinkError>,
        now_ms: u64,
    ) -> bool {
        self.refreshing = false;
        match result {
            Ok(info) => {
                let before = self.identity.id.clone();
                let had_thumb = self.identity.thumbnail_url.is_some();
                self.apply(info, now_ms);
                before != self.identity.id || had_thumb != self.identity.thumbnail_url.is_some()
            }
            Err(e) => {
                debug!("reference refresh failed: {}", e);
                false
            }
        }
    }
}
