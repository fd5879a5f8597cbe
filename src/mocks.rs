use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, ImageResult, Luma};
use parking_lot::{Mutex, RwLock};

use crate::acquire::ImageHandle;
use crate::buffer::PixelBuffer;
use crate::errors::{PhotoSegError, Result};
use crate::orientation::{OrientationTag, RotationDegrees};
use crate::segmentation::{
    pascal_voc_labels, regions_from_category_mask, LabeledRegion, SegmentationResult,
};
use crate::traits::{ImagePreview, ImageSegmenter, MetadataReader, Notifier, ResultRenderer};

/// Metadata reader that reports a fixed tag for every path.
///
/// Clones share the record of which threads performed reads.
#[derive(Debug, Clone, Default)]
pub struct MockMetadataReader {
    tag: OrientationTag,
    reads: Arc<Mutex<Vec<ThreadId>>>,
}

impl MockMetadataReader {
    pub fn new(tag: OrientationTag) -> Self {
        Self {
            tag,
            reads: Arc::default(),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().len()
    }

    pub fn read_threads(&self) -> Vec<ThreadId> {
        self.reads.lock().clone()
    }
}

impl MetadataReader for MockMetadataReader {
    fn read_orientation(&self, _path: &Path) -> OrientationTag {
        self.reads.lock().push(std::thread::current().id());
        self.tag
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewBehavior {
    Immediate,
    NeverLoads,
}

/// Preview whose content is fixed up front.
#[derive(Debug)]
pub struct MockPreview {
    image: RwLock<Option<DynamicImage>>,
    behavior: PreviewBehavior,
    loads: Mutex<Vec<ImageHandle>>,
    snapshots: AtomicUsize,
}

impl MockPreview {
    fn with(image: Option<DynamicImage>, behavior: PreviewBehavior) -> Self {
        Self {
            image: RwLock::new(image),
            behavior,
            loads: Mutex::new(Vec::new()),
            snapshots: AtomicUsize::new(0),
        }
    }

    /// Already showing `image` and reports loaded straight away.
    pub fn ready(image: DynamicImage) -> Self {
        Self::with(Some(image), PreviewBehavior::Immediate)
    }

    /// Finished loading but has nothing to show.
    pub fn empty() -> Self {
        Self::with(None, PreviewBehavior::Immediate)
    }

    /// Never finishes loading.
    pub fn never_loads() -> Self {
        Self::with(None, PreviewBehavior::NeverLoads)
    }

    pub fn loads(&self) -> Vec<ImageHandle> {
        self.loads.lock().clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImagePreview for MockPreview {
    fn load(&self, handle: &ImageHandle) {
        self.loads.lock().push(handle.clone());
    }

    fn snapshot(&self) -> Option<DynamicImage> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.image.read().clone()
    }

    async fn loaded(&self) {
        if self.behavior == PreviewBehavior::NeverLoads {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone)]
enum MockResponse {
    Echo,
    Fixed(SegmentationResult),
    Fail(String),
}

/// Segmenter that records its calls and answers from a script.
#[derive(Debug)]
pub struct MockSegmenter {
    response: MockResponse,
    calls: Mutex<Vec<(PixelBuffer, RotationDegrees)>>,
}

impl MockSegmenter {
    fn with(response: MockResponse) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Labels the whole rotated image as background.
    pub fn echo() -> Self {
        Self::with(MockResponse::Echo)
    }

    pub fn fixed(result: SegmentationResult) -> Self {
        Self::with(MockResponse::Fixed(result))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with(MockResponse::Fail(message.into()))
    }

    pub fn calls(&self) -> Vec<(PixelBuffer, RotationDegrees)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ImageSegmenter for MockSegmenter {
    async fn segment(
        &self,
        buffer: PixelBuffer,
        rotation: RotationDegrees,
    ) -> Result<SegmentationResult> {
        let (width, height) = match rotation {
            RotationDegrees::D90 | RotationDegrees::D270 => (buffer.height(), buffer.width()),
            RotationDegrees::D0 | RotationDegrees::D180 => buffer.dimensions(),
        };
        self.calls.lock().push((buffer, rotation));

        match &self.response {
            MockResponse::Echo => Ok(SegmentationResult {
                regions: regions_from_category_mask(
                    &GrayImage::from_pixel(width, height, Luma([0])),
                    &pascal_voc_labels(),
                ),
                inference_time: Duration::from_millis(5),
                image_height: height,
                image_width: width,
            }),
            MockResponse::Fixed(result) => Ok(result.clone()),
            MockResponse::Fail(message) => Err(PhotoSegError::segmentation(message.clone())),
        }
    }
}

/// One renderer call, as seen by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    SetResults {
        regions: usize,
        image_height: u32,
        image_width: u32,
    },
    Invalidate,
}

/// Renderer that records calls; clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    calls: Arc<Mutex<Vec<RenderCall>>>,
    last_regions: Arc<Mutex<Vec<LabeledRegion>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    pub fn last_regions(&self) -> Vec<LabeledRegion> {
        self.last_regions.lock().clone()
    }
}

impl ResultRenderer for RecordingRenderer {
    fn set_results(&mut self, regions: &[LabeledRegion], image_height: u32, image_width: u32) {
        *self.last_regions.lock() = regions.to_vec();
        self.calls.lock().push(RenderCall::SetResults {
            regions: regions.len(),
            image_height,
            image_width,
        });
    }

    fn invalidate(&mut self) {
        self.calls.lock().push(RenderCall::Invalidate);
    }
}

/// Notifier that records messages; clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Encodes a black JPEG carrying an EXIF orientation tag.
pub fn jpeg_with_exif_orientation(
    width: u32,
    height: u32,
    orientation: u16,
) -> ImageResult<Vec<u8>> {
    let mut encoded = Vec::new();
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)?;

    // APP1: marker + length + "Exif\0\0" + little-endian TIFF header + IFD0 with one entry
    let tiff_len: u16 = 8 + 2 + 12 + 4;
    let app1_len: u16 = 2 + 6 + tiff_len;
    let mut app1 = Vec::with_capacity(2 + app1_len as usize);
    app1.extend_from_slice(&[0xFF, 0xE1]);
    app1.extend_from_slice(&app1_len.to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(b"II");
    app1.extend_from_slice(&42u16.to_le_bytes());
    app1.extend_from_slice(&8u32.to_le_bytes());
    app1.extend_from_slice(&1u16.to_le_bytes());
    app1.extend_from_slice(&0x0112u16.to_le_bytes());
    app1.extend_from_slice(&3u16.to_le_bytes());
    app1.extend_from_slice(&1u32.to_le_bytes());
    app1.extend_from_slice(&orientation.to_le_bytes());
    app1.extend_from_slice(&[0, 0]);
    app1.extend_from_slice(&0u32.to_le_bytes());

    // right after SOI
    let tail = encoded.split_off(2);
    encoded.extend(app1);
    encoded.extend(tail);
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[tokio::test]
    async fn test_mock_segmenter_echo_swaps_dimensions() -> Result<()> {
        let segmenter = MockSegmenter::echo();
        let buffer = PixelBuffer::from_rgba(RgbaImage::from_pixel(8, 3, Rgba([0, 0, 0, 255])));

        let result = segmenter.segment(buffer, RotationDegrees::D90).await?;
        assert_eq!((result.image_width, result.image_height), (3, 8));
        assert_eq!(segmenter.call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_mock_segmenter_failure() {
        let segmenter = MockSegmenter::failing("boom");
        let buffer = PixelBuffer::from_rgba(RgbaImage::new(1, 1));

        let err = segmenter.segment(buffer, RotationDegrees::D0).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_jpeg_fixture_decodes() -> Result<()> {
        let bytes = jpeg_with_exif_orientation(5, 4, 6)?;
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (5, 4));
        Ok(())
    }
}
