use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use parking_lot::Mutex;
use tracing::debug;
use url::Url;
use walkdir::WalkDir;

use crate::errors::{PhotoSegError, Result};
use crate::traits::ImageSource;

/// Reference to a picked or captured image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    path: PathBuf,
}

impl ImageHandle {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Accepts `file://` URIs and bare paths.
    ///
    /// URI paths are percent-decoded. Only an empty host or `localhost`
    /// names a local file; any other authority is rejected.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |reason: String| PhotoSegError::Validation {
            field: "image uri".to_string(),
            reason,
        };

        if uri.is_empty() {
            return Err(invalid("must not be empty".to_string()));
        }
        if !uri.contains("://") {
            return Ok(Self::from_path(uri));
        }

        let url = Url::parse(uri).map_err(|e| invalid(format!("{uri}: {e}")))?;
        if url.scheme() != "file" {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }
        let path = url
            .to_file_path()
            .map_err(|_| invalid(format!("not a local file: {uri}")))?;
        if path.file_name().is_none() {
            return Err(invalid(format!("has no path: {uri}")));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Which picker surfaces the user may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureMode {
    #[default]
    CameraOnly,
    GalleryOnly,
    CameraOrGallery,
}

impl CaptureMode {
    /// Whether a source offering `self` can serve a request for `requested`.
    pub const fn serves(self, requested: CaptureMode) -> bool {
        matches!(
            (self, requested),
            (_, CaptureMode::CameraOrGallery)
                | (CaptureMode::CameraOrGallery, _)
                | (CaptureMode::CameraOnly, CaptureMode::CameraOnly)
                | (CaptureMode::GalleryOnly, CaptureMode::GalleryOnly)
        )
    }
}

/// Modal picker over a fixed queue of images.
///
/// Each `acquire` hands out the next staged image; an empty queue or an
/// incompatible mode behaves like the user backing out of the picker.
#[derive(Debug, Default)]
pub struct StagedSource {
    mode: CaptureMode,
    pending: Mutex<VecDeque<ImageHandle>>,
}

impl StagedSource {
    pub fn new(mode: CaptureMode, handles: impl IntoIterator<Item = ImageHandle>) -> Self {
        Self {
            mode,
            pending: Mutex::new(handles.into_iter().collect()),
        }
    }

    /// A source that always cancels.
    pub fn empty(mode: CaptureMode) -> Self {
        Self::new(mode, std::iter::empty())
    }

    /// A single freshly captured photo.
    pub fn camera(path: impl AsRef<Path>) -> Self {
        Self::new(CaptureMode::CameraOnly, [ImageHandle::from_path(path)])
    }

    /// Every decodable image below `dir`, in sorted order.
    pub fn scan_directory(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(PhotoSegError::FileSystem {
                path: dir.to_path_buf(),
                operation: "directory scan".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Gallery directory does not exist",
                ),
            });
        }

        let handles = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| ImageFormat::from_path(e.path()).is_ok())
            .map(|e| ImageHandle::from_path(e.path()));

        Ok(Self::new(CaptureMode::GalleryOnly, handles))
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn remaining(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl ImageSource for StagedSource {
    async fn acquire(&self, mode: CaptureMode) -> Option<ImageHandle> {
        if !self.mode.serves(mode) {
            debug!(offered = ?self.mode, requested = ?mode, "picker mode mismatch, nothing picked");
            return None;
        }
        self.pending.lock().pop_front()
    }
}
