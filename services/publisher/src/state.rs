//! The video currently being served.
//!
//! Both fields change together under one write lock, so readers see either
//! the previous publish or the new one, never a mix.

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// Snapshot of the active video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPointer {
    /// URL handed to clients
    pub public_url: String,
    /// Local copy served at /video.mp4; `None` until the first publish
    pub local_file: Option<PathBuf>,
}

/// Shared, lock-guarded video pointer
#[derive(Debug, Clone)]
pub struct VideoState {
    inner: Arc<RwLock<VideoPointer>>,
}

impl VideoState {
    pub fn new(placeholder_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VideoPointer {
                public_url: placeholder_url.into(),
                local_file: None,
            })),
        }
    }

    pub fn get(&self) -> VideoPointer {
        self.inner.read().clone()
    }

    pub fn public_url(&self) -> String {
        self.inner.read().public_url.clone()
    }

    pub fn local_file(&self) -> Option<PathBuf> {
        self.inner.read().local_file.clone()
    }

    /// Swap in a newly published video
    pub fn set(&self, public_url: impl Into<String>, local_file: impl Into<PathBuf>) {
        let pointer = VideoPointer {
            public_url: public_url.into(),
            local_file: Some(local_file.into()),
        };
        *self.inner.write() = pointer;
    }
}
