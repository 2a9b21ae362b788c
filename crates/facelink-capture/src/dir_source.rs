//! Directory-backed frame source: cycles the images of a folder in name order.
//!
//! Stands in for a camera on hosts without one (and for replaying captured
//! sequences). Frames are decoded on demand at native resolution.

use std::path::{Path, PathBuf};
use std::time::Instant;

use facelink_core::FaceLinkError;
use tracing::{info, warn};

use crate::{MediaSource, VideoFrame};

const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    started: Option<Instant>,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), files: Vec::new(), cursor: 0, started: None }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    fn scan(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl MediaSource for ImageDirSource {
    fn start(&mut self) -> Result<(), FaceLinkError> {
        let files = self.scan().map_err(|e| {
            FaceLinkError::capability(format!(
                "cannot open frame directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        if files.is_empty() {
            return Err(FaceLinkError::capability(format!(
                "no images in frame directory {}",
                self.dir.display()
            )));
        }
        info!("frame source: {} images from {}", files.len(), self.dir.display());
        self.files = files;
        self.cursor = 0;
        self.started = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.started = None;
    }

    fn is_active(&self) -> bool {
        self.started.is_some()
    }

    fn current_frame(&mut self) -> Option<VideoFrame> {
        let started = self.started?;
        let path = self.files.get(self.cursor)?.clone();
        self.cursor = (self.cursor + 1) % self.files.len();

        match image::open(&path) {
            Ok(img) => Some(VideoFrame::new(img.to_rgba8(), started.elapsed().as_millis() as u64)),
            Err(e) => {
                warn!("skipping unreadable frame {}: {}", path.display(), e);
                None
            }
        }
    }
}
