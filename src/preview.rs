use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageResult};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::acquire::ImageHandle;
use crate::traits::ImagePreview;

/// Progress of the most recent load, tagged with its generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading(u64),
    Ready(u64),
    Failed(u64),
}

/// Preview that decodes the picked file on the blocking pool.
///
/// Every `load` starts a new generation; a decode finishing for an older
/// generation is thrown away so the preview always reflects the latest pick.
/// Must be used from inside a tokio runtime.
#[derive(Clone)]
pub struct DecodingPreview {
    inner: Arc<PreviewInner>,
}

struct PreviewInner {
    image: RwLock<Option<DynamicImage>>,
    generation: AtomicU64,
    state: watch::Sender<LoadState>,
}

impl DecodingPreview {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self {
            inner: Arc::new(PreviewInner {
                image: RwLock::new(None),
                generation: AtomicU64::new(0),
                state,
            }),
        }
    }

    pub fn state(&self) -> LoadState {
        *self.inner.state.borrow()
    }
}

impl Default for DecodingPreview {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewInner {
    fn finish(
        &self,
        generation: u64,
        path: &Path,
        decoded: Result<ImageResult<DynamicImage>, JoinError>,
    ) {
        // held across the check so a concurrent `load` cannot interleave
        let mut image = self.image.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, path = %path.display(), "discarding superseded preview load");
            return;
        }

        match decoded {
            Ok(Ok(decoded)) => {
                debug!(
                    generation,
                    width = decoded.width(),
                    height = decoded.height(),
                    "preview loaded"
                );
                *image = Some(decoded);
                self.state.send_replace(LoadState::Ready(generation));
            }
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "failed to decode preview image");
                self.state.send_replace(LoadState::Failed(generation));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "preview decode task failed");
                self.state.send_replace(LoadState::Failed(generation));
            }
        }
    }
}

#[async_trait]
impl ImagePreview for DecodingPreview {
    fn load(&self, handle: &ImageHandle) {
        let generation = {
            let mut image = self.inner.image.write();
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *image = None;
            self.inner.state.send_replace(LoadState::Loading(generation));
            generation
        };

        let inner = Arc::clone(&self.inner);
        let path: PathBuf = handle.path().to_path_buf();
        tokio::spawn(async move {
            let decode_path = path.clone();
            let decoded = tokio::task::spawn_blocking(move || image::open(&decode_path)).await;
            inner.finish(generation, &path, decoded);
        });
    }

    fn snapshot(&self) -> Option<DynamicImage> {
        self.inner.image.read().clone()
    }

    async fn loaded(&self) {
        let mut rx = self.inner.state.subscribe();
        loop {
            let loading = matches!(*rx.borrow_and_update(), LoadState::Loading(_));
            if !loading {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_idle_preview_is_empty() {
        let preview = DecodingPreview::new();
        preview.loaded().await;
        assert_eq!(preview.state(), LoadState::Idle);
        assert!(preview.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_load_decodes_file() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("photo.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 5, Rgb([1, 2, 3]))).save(&path)?;

        let preview = DecodingPreview::new();
        preview.load(&ImageHandle::from_path(&path));
        preview.loaded().await;

        assert_eq!(preview.state(), LoadState::Ready(1));
        let image = preview.snapshot().expect("preview should hold the decoded image");
        assert_eq!((image.width(), image.height()), (7, 5));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_load_leaves_preview_empty() {
        let preview = DecodingPreview::new();
        preview.load(&ImageHandle::from_path("/no/such/photo.jpg"));
        preview.loaded().await;

        assert_eq!(preview.state(), LoadState::Failed(1));
        assert!(preview.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_latest_load_wins() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let first = temp_dir.path().join("first.png");
        let second = temp_dir.path().join("second.png");
        DynamicImage::new_rgb8(3, 3).save(&first)?;
        DynamicImage::new_rgb8(9, 4).save(&second)?;

        let preview = DecodingPreview::new();
        preview.load(&ImageHandle::from_path(&first));
        preview.load(&ImageHandle::from_path(&second));
        preview.loaded().await;

        assert_eq!(preview.state(), LoadState::Ready(2));
        let image = preview.snapshot().expect("second image should be shown");
        assert_eq!((image.width(), image.height()), (9, 4));
        Ok(())
    }
}
