//! Downloadable / previewable resources.
//!
//! Every preview, processed video, and recording the client exposes is a
//! [`ResourceHandle`] created by a [`BlobStore`]. Handles are move-only and
//! [`BlobStore::revoke`] consumes them, so a resource can be released at most
//! once. Owners revoke the previous handle when a new one supersedes it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, warn};
use url::Url;

use crate::errors::FaceLinkError;

/// A live resource. Not `Clone`: hand it back to its store to release it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "resources must be revoked through their BlobStore"]
pub struct ResourceHandle {
    id: u64,
    url: String,
    mime: String,
    len: usize,
}

impl ResourceHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub trait BlobStore: Send {
    /// Materialise `data` as a resource. `label` is a file-name hint.
    fn create(
        &mut self,
        data: Bytes,
        mime: &str,
        label: &str,
    ) -> Result<ResourceHandle, FaceLinkError>;

    fn revoke(&mut self, handle: ResourceHandle);
}

/// Revoke the handle in `slot`, if any.
pub fn release(store: &mut dyn BlobStore, slot: &mut Option<ResourceHandle>) {
    if let Some(handle) = slot.take() {
        store.revoke(handle);
    }
}

// ── FileBlobStore ─────────────────────────────────────────────────────────────

/// Writes resources as files under a directory and deletes them on revoke.
pub struct FileBlobStore {
    dir: PathBuf,
    next_id: u64,
    paths: HashMap<u64, PathBuf>,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), next_id: 1, paths: HashMap::new() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path backing a live handle.
    pub fn path_of(&self, handle: &ResourceHandle) -> Option<&Path> {
        self.paths.get(&handle.id).map(PathBuf::as_path)
    }
}

impl BlobStore for FileBlobStore {
    fn create(
        &mut self,
        data: Bytes,
        mime: &str,
        label: &str,
    ) -> Result<ResourceHandle, FaceLinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let id = self.next_id;
        self.next_id += 1;

        let path = self.dir.join(format!("{}-{}", id, sanitize(label)));
        let url = file_url(&path)?;
        std::fs::write(&path, &data)?;
        debug!("resource {} created at {} ({} bytes)", id, path.display(), data.len());

        let handle = ResourceHandle {
            id,
            url,
            mime: mime.to_owned(),
            len: data.len(),
        };
        self.paths.insert(id, path);
        Ok(handle)
    }

    fn revoke(&mut self, handle: ResourceHandle) {
        let Some(path) = self.paths.remove(&handle.id) else {
            warn!("revoke of unknown resource {}", handle.id);
            return;
        };
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("failed to remove {}: {}", path.display(), e);
        } else {
            debug!("resource {} revoked", handle.id);
        }
    }
}

fn file_url(path: &Path) -> Result<String, FaceLinkError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute).map(String::from).map_err(|()| {
        FaceLinkError::ConfigurationInvalid {
            reason: format!("cannot express {} as a file URL", absolute.display()),
        }
    })
}

/// Local path behind a `file://` resource URL.
pub fn file_path(url: &str) -> Option<PathBuf> {
    let url = Url::parse(url).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "blob".to_owned()
    } else {
        cleaned
    }
}

// ── MemoryBlobStore ───────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    next_id: u64,
    blobs: HashMap<u64, (Bytes, String)>,
    created: u64,
    revoked: u64,
}

/// In-memory store. Clones share the same contents and counters.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn created(&self) -> u64 {
        self.lock().created
    }

    pub fn revoked(&self) -> u64 {
        self.lock().revoked
    }

    /// Resources created and not yet revoked.
    pub fn live(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn contents(&self, url: &str) -> Option<Bytes> {
        let url = Url::parse(url).ok()?;
        if url.scheme() != "mem" {
            return None;
        }
        let id = url.host_str()?.parse::<u64>().ok()?;
        self.lock().blobs.get(&id).map(|(data, _)| data.clone())
    }
}

impl BlobStore for MemoryBlobStore {
    fn create(
        &mut self,
        data: Bytes,
        mime: &str,
        label: &str,
    ) -> Result<ResourceHandle, FaceLinkError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        inner.created += 1;
        let id = inner.next_id;
        let len = data.len();
        inner.blobs.insert(id, (data, mime.to_owned()));
        Ok(ResourceHandle {
            id,
            url: format!("mem://{}/{}", id, sanitize(label)),
            mime: mime.to_owned(),
            len,
        })
    }

    fn revoke(&mut self, handle: ResourceHandle) {
        let mut inner = self.lock();
        if inner.blobs.remove(&handle.id).is_some() {
            inner.revoked += 1;
        } else {
            warn!("revoke of unknown resource {}", handle.id);
        }
    }
}
