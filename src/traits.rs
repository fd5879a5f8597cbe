use std::path::Path;

use async_trait::async_trait;
use image::DynamicImage;

use crate::acquire::{CaptureMode, ImageHandle};
use crate::buffer::PixelBuffer;
use crate::errors::Result;
use crate::orientation::{OrientationTag, RotationDegrees};
use crate::segmentation::{LabeledRegion, SegmentationResult};

/// Camera or gallery picker.
///
/// The picker UI is entirely the implementor's business; `None` means the
/// user backed out and nothing was picked.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn acquire(&self, mode: CaptureMode) -> Option<ImageHandle>;
}

/// Reads the embedded orientation of an image file.
///
/// Must not fail: a missing file, missing metadata or missing tag all read
/// as `OrientationTag::Normal`.
pub trait MetadataReader: Send + Sync {
    fn read_orientation(&self, path: &Path) -> OrientationTag;
}

/// The view that displays the acquired image while it loads in the background.
#[async_trait]
pub trait ImagePreview: Send + Sync {
    /// Starts loading `handle`, replacing whatever was shown before.
    fn load(&self, handle: &ImageHandle);

    /// The currently displayed image, if any has finished loading.
    fn snapshot(&self) -> Option<DynamicImage>;

    /// Resolves once the most recent `load` has finished, successfully or not.
    async fn loaded(&self);
}

/// Runs segmentation on a buffer.
///
/// Once called it runs to completion; there is no way to cancel it.
#[async_trait]
pub trait ImageSegmenter: Send + Sync {
    async fn segment(
        &self,
        buffer: PixelBuffer,
        rotation: RotationDegrees,
    ) -> Result<SegmentationResult>;
}

/// Receives the outcome of one segmentation.
///
/// May be called from any thread.
pub trait SegmentationListener: Send + Sync {
    fn on_results(&self, result: SegmentationResult);
    fn on_error(&self, error: String);
}

/// Draws segmentation results. Only ever touched from the UI loop.
pub trait ResultRenderer: Send {
    fn set_results(&mut self, regions: &[LabeledRegion], image_height: u32, image_width: u32);

    /// Requests a redraw with the current results.
    fn invalidate(&mut self);
}

/// Short-lived user-facing message, e.g. a toast.
pub trait Notifier: Send {
    fn notify(&mut self, message: &str);
}
