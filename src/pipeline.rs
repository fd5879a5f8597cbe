use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::acquire::{CaptureMode, ImageHandle};
use crate::buffer::PixelBuffer;
use crate::errors::PhotoSegError;
use crate::lifecycle::LifecycleScope;
use crate::materialize::{BufferMaterializer, SettlePolicy};
use crate::orientation::{OrientationNormalizer, RotationDegrees};
use crate::traits::{
    ImagePreview, ImageSegmenter, ImageSource, MetadataReader, SegmentationListener,
};

/// How one acquired frame ended up.
#[derive(Debug)]
pub enum FrameOutcome {
    /// A buffer reached the segmenter.
    Submitted(SubmittedFrame),
    /// The preview had nothing to copy after the fixed delay.
    BufferUnavailable,
    /// The preview never reported a finished load.
    TimedOut(PhotoSegError),
    /// The hosting view went away during the settle step.
    ViewDestroyed,
}

impl FrameOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted(_))
    }
}

/// A frame whose segmentation is in flight.
#[derive(Debug)]
pub struct SubmittedFrame {
    pub frame_id: Uuid,
    pub rotation: RotationDegrees,
    pub width: u32,
    pub height: u32,
    delivery: JoinHandle<()>,
}

impl SubmittedFrame {
    /// Waits until the listener has been called.
    pub async fn delivered(self) {
        if let Err(e) = self.delivery.await {
            warn!(frame_id = %self.frame_id, error = %e, "segmentation delivery task failed");
        }
    }
}

/// Settle step of one frame, running on the lifecycle scope.
#[derive(Debug)]
pub struct FrameTask {
    frame_id: Uuid,
    handle: JoinHandle<Option<FrameOutcome>>,
}

impl FrameTask {
    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub async fn outcome(self) -> FrameOutcome {
        match self.handle.await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                debug!(frame_id = %self.frame_id, "view destroyed before the buffer was copied");
                FrameOutcome::ViewDestroyed
            }
            Err(e) => {
                warn!(frame_id = %self.frame_id, error = %e, "frame task failed");
                FrameOutcome::ViewDestroyed
            }
        }
    }
}

/// Acquire → orient → settle and copy → segment → notify listener.
pub struct SegmentationPipeline<S, M, P, G>
where
    S: ImageSource,
    M: MetadataReader + 'static,
    P: ImagePreview + 'static,
    G: ImageSegmenter + 'static,
{
    source: S,
    normalizer: Arc<OrientationNormalizer<M>>,
    preview: Arc<P>,
    segmenter: Arc<G>,
    listener: Arc<dyn SegmentationListener>,
    materializer: BufferMaterializer,
    scope: LifecycleScope,
    mode: CaptureMode,
}

impl<S, M, P, G> SegmentationPipeline<S, M, P, G>
where
    S: ImageSource,
    M: MetadataReader + 'static,
    P: ImagePreview + 'static,
    G: ImageSegmenter + 'static,
{
    pub fn new(
        source: S,
        metadata: M,
        preview: Arc<P>,
        segmenter: Arc<G>,
        listener: Arc<dyn SegmentationListener>,
    ) -> Self {
        Self {
            source,
            normalizer: Arc::new(OrientationNormalizer::new(metadata)),
            preview,
            segmenter,
            listener,
            materializer: BufferMaterializer::default(),
            scope: LifecycleScope::new(),
            mode: CaptureMode::default(),
        }
    }

    pub fn with_settle_policy(mut self, policy: SettlePolicy) -> Self {
        self.materializer = BufferMaterializer::new(policy);
        self
    }

    pub const fn with_capture_mode(mut self, mode: CaptureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn scope(&self) -> &LifecycleScope {
        &self.scope
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Opens the picker and feeds its result into the pipeline.
    ///
    /// `None` when the user cancelled or the view is already gone.
    pub async fn capture(&self) -> Option<FrameTask> {
        if self.scope.is_destroyed() {
            debug!("view destroyed, not opening the picker");
            return None;
        }
        let picked = self.source.acquire(self.mode).await;
        self.on_capture_result(picked)
    }

    /// Handles a picker result.
    pub fn on_capture_result(&self, picked: Option<ImageHandle>) -> Option<FrameTask> {
        let Some(handle) = picked else {
            debug!(mode = ?self.mode, "capture cancelled, nothing to segment");
            return None;
        };
        if self.scope.is_destroyed() {
            debug!(path = %handle.path().display(), "view destroyed, ignoring capture result");
            return None;
        }

        let frame_id = Uuid::new_v4();
        let span = info_span!("frame", %frame_id, path = %handle.path().display());

        self.preview.load(&handle);

        let normalizer = Arc::clone(&self.normalizer);
        let materializer = self.materializer;
        let preview = Arc::clone(&self.preview);
        let segmenter = Arc::clone(&self.segmenter);
        let listener = Arc::clone(&self.listener);

        let settle = async move {
            // metadata is read from disk while the preview settles
            let span = Span::current();
            let rotation_read = tokio::task::spawn_blocking(move || {
                span.in_scope(|| normalizer.rotation_for(&handle))
            });

            let buffer = match materializer.materialize(preview.as_ref()).await {
                Ok(Some(buffer)) => buffer,
                Ok(None) => {
                    debug!("no decodable image after settling, dropping frame");
                    return FrameOutcome::BufferUnavailable;
                }
                Err(e) => {
                    warn!(error = %e, "preview never settled, dropping frame");
                    return FrameOutcome::TimedOut(e);
                }
            };
            let rotation = rotation_read.await.unwrap_or_else(|e| {
                warn!(error = %e, "orientation read failed, assuming upright");
                RotationDegrees::D0
            });

            let (width, height) = buffer.dimensions();
            info!(width, height, %rotation, "submitting buffer for segmentation");
            let delivery = tokio::spawn(
                deliver(segmenter, buffer, rotation, listener).in_current_span(),
            );

            FrameOutcome::Submitted(SubmittedFrame {
                frame_id,
                rotation,
                width,
                height,
                delivery,
            })
        };

        Some(FrameTask {
            frame_id,
            handle: self.scope.launch(settle.instrument(span)),
        })
    }

    /// Tears the view down: pending frames are dropped, in-flight
    /// segmentations still reach the listener.
    pub async fn shutdown(&self) {
        self.scope.destroy().await;
    }
}

async fn deliver<G>(
    segmenter: Arc<G>,
    buffer: PixelBuffer,
    rotation: RotationDegrees,
    listener: Arc<dyn SegmentationListener>,
) where
    G: ImageSegmenter + ?Sized,
{
    match segmenter.segment(buffer, rotation).await {
        Ok(result) => {
            debug!(
                regions = result.regions.len(),
                inference_ms = result.inference_time.as_millis() as u64,
                "segmentation finished"
            );
            listener.on_results(result);
        }
        Err(e) => {
            warn!(error = %e, "segmentation failed");
            listener.on_error(e.to_string());
        }
    }
}
