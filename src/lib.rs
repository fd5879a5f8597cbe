pub mod acquire;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod materialize;
pub mod model;
pub mod orientation;
pub mod pipeline;
pub mod preview;
pub mod segmentation;
pub mod traits;
pub mod ui;

pub mod mocks;

pub use acquire::{CaptureMode, ImageHandle, StagedSource};
pub use buffer::PixelBuffer;
pub use config::Config;
pub use errors::{PhotoSegError, Result};
pub use lifecycle::LifecycleScope;
pub use materialize::{BufferMaterializer, SettlePolicy, DEFAULT_SETTLE_DELAY};
pub use model::OnnxSegmenter;
pub use orientation::{
    exif_to_degrees, ExifMetadataReader, OrientationNormalizer, OrientationTag, RotationDegrees,
};
pub use pipeline::{FrameOutcome, FrameTask, SegmentationPipeline, SubmittedFrame};
pub use preview::{DecodingPreview, LoadState};
pub use segmentation::{ColoredLabel, LabeledRegion, SegmentationResult};
pub use traits::*;
pub use ui::{ui_channel, ConsoleNotifier, ConsoleRenderer, UiEvent, UiHandle, UiLoop};
