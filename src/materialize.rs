use std::time::Duration;

use tracing::debug;

use crate::buffer::PixelBuffer;
use crate::errors::{PhotoSegError, Result};
use crate::traits::ImagePreview;

/// Delay the picked image gets to appear in the preview before it is copied.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// How long to wait for the preview before copying it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep, then take whatever the preview shows. Slow devices can miss.
    FixedDelay(Duration),
    /// Wait for the preview to report its load finished.
    AwaitLoaded { timeout: Duration },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::FixedDelay(DEFAULT_SETTLE_DELAY)
    }
}

/// Copies the settled preview into a fresh [`PixelBuffer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferMaterializer {
    policy: SettlePolicy,
}

impl BufferMaterializer {
    pub const fn new(policy: SettlePolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> SettlePolicy {
        self.policy
    }

    /// `Ok(None)` when the preview has nothing to copy once settled.
    ///
    /// Under `AwaitLoaded`, a preview that never reports back within the
    /// timeout yields `SettleTimeout`.
    pub async fn materialize<P>(&self, preview: &P) -> Result<Option<PixelBuffer>>
    where
        P: ImagePreview + ?Sized,
    {
        match self.policy {
            SettlePolicy::FixedDelay(delay) => {
                tokio::time::sleep(delay).await;
            }
            SettlePolicy::AwaitLoaded { timeout } => {
                tokio::time::timeout(timeout, preview.loaded())
                    .await
                    .map_err(|_| PhotoSegError::SettleTimeout { waited: timeout })?;
            }
        }

        let buffer = preview.snapshot().map(|image| PixelBuffer::from_image(&image));
        if buffer.is_none() {
            debug!(policy = ?self.policy, "preview had no image after settling");
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockPreview;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 4, Rgba([9, 8, 7, 255])))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_waits_before_copying() -> Result<()> {
        let preview = MockPreview::ready(sample_image());
        let materializer = BufferMaterializer::default();

        let started = tokio::time::Instant::now();
        let buffer = materializer.materialize(&preview).await?;

        assert!(started.elapsed() >= DEFAULT_SETTLE_DELAY);
        assert_eq!(buffer, Some(PixelBuffer::from_image(&sample_image())));
        assert_eq!(preview.snapshot_count(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_with_empty_preview_is_silent() -> Result<()> {
        let preview = MockPreview::empty();
        let buffer = BufferMaterializer::default().materialize(&preview).await?;
        assert!(buffer.is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_loaded_copies_without_fixed_wait() -> Result<()> {
        let preview = MockPreview::ready(sample_image());
        let materializer = BufferMaterializer::new(SettlePolicy::AwaitLoaded {
            timeout: Duration::from_secs(5),
        });

        let started = tokio::time::Instant::now();
        let buffer = materializer.materialize(&preview).await?;

        assert!(started.elapsed() < Duration::from_millis(1));
        assert!(buffer.is_some());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_loaded_times_out() {
        let preview = MockPreview::never_loads();
        let materializer = BufferMaterializer::new(SettlePolicy::AwaitLoaded {
            timeout: Duration::from_millis(250),
        });

        match materializer.materialize(&preview).await {
            Err(PhotoSegError::SettleTimeout { waited }) => {
                assert_eq!(waited, Duration::from_millis(250))
            }
            other => panic!("Expected SettleTimeout, got {other:?}"),
        }
        assert_eq!(preview.snapshot_count(), 0);
    }
}
