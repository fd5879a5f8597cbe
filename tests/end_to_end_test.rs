use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use photo_seg_rs::mocks::{
    jpeg_with_exif_orientation, MockSegmenter, RecordingNotifier, RecordingRenderer, RenderCall,
};
use photo_seg_rs::{
    ui_channel, CaptureMode, DecodingPreview, ExifMetadataReader, FrameOutcome, RotationDegrees,
    SegmentationPipeline, SettlePolicy, StagedSource,
};

#[tokio::test]
async fn test_rotated_photo_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let photo = temp_dir.path().join("IMG_0001.jpg");
    std::fs::write(&photo, jpeg_with_exif_orientation(10, 6, 6)?)?;

    let segmenter = Arc::new(MockSegmenter::echo());
    let renderer = RecordingRenderer::new();
    let notifier = RecordingNotifier::new();
    let (ui, ui_loop) = ui_channel(renderer.clone(), notifier.clone());
    let ui_task = tokio::spawn(ui_loop.run(CancellationToken::new()));

    let pipeline = SegmentationPipeline::new(
        StagedSource::camera(&photo),
        ExifMetadataReader::new(),
        Arc::new(DecodingPreview::new()),
        Arc::clone(&segmenter),
        Arc::new(ui),
    )
    .with_settle_policy(SettlePolicy::AwaitLoaded {
        timeout: Duration::from_secs(10),
    });

    let task = pipeline.capture().await.ok_or("capture was cancelled")?;
    match task.outcome().await {
        FrameOutcome::Submitted(frame) => {
            assert_eq!(frame.rotation, RotationDegrees::D90);
            assert_eq!((frame.width, frame.height), (10, 6));
            frame.delivered().await;
        }
        other => panic!("Expected a submitted frame, got {other:?}"),
    }
    drop(pipeline);
    ui_task.await?;

    let calls = segmenter.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.dimensions(), (10, 6));

    // the segmenter worked on the upright image, 6 wide and 10 tall
    assert_eq!(
        renderer.calls(),
        vec![
            RenderCall::SetResults {
                regions: 1,
                image_height: 10,
                image_width: 6,
            },
            RenderCall::Invalidate,
        ]
    );
    assert!(notifier.messages().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fixed_delay_with_real_preview() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let photo = temp_dir.path().join("plain.png");
    image::DynamicImage::new_rgb8(16, 9).save(&photo)?;

    let segmenter = Arc::new(MockSegmenter::echo());
    let (ui, _ui_loop) = ui_channel(RecordingRenderer::new(), RecordingNotifier::new());

    let pipeline = SegmentationPipeline::new(
        StagedSource::camera(&photo),
        ExifMetadataReader::new(),
        Arc::new(DecodingPreview::new()),
        Arc::clone(&segmenter),
        Arc::new(ui),
    )
    .with_settle_policy(SettlePolicy::FixedDelay(Duration::from_millis(500)));

    let task = pipeline.capture().await.ok_or("capture was cancelled")?;
    match task.outcome().await {
        FrameOutcome::Submitted(frame) => {
            assert_eq!(frame.rotation, RotationDegrees::D0);
            frame.delivered().await;
        }
        other => panic!("Expected a submitted frame, got {other:?}"),
    }

    assert_eq!(segmenter.call_count(), 1);
    assert_eq!(segmenter.calls()[0].0.dimensions(), (16, 9));
    Ok(())
}

#[tokio::test]
async fn test_undecodable_photo_is_dropped() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let photo = temp_dir.path().join("broken.jpg");
    std::fs::write(&photo, b"\xFF\xD8 definitely not a jpeg")?;

    let segmenter = Arc::new(MockSegmenter::echo());
    let notifier = RecordingNotifier::new();
    let (ui, _ui_loop) = ui_channel(RecordingRenderer::new(), notifier.clone());

    let pipeline = SegmentationPipeline::new(
        StagedSource::camera(&photo),
        ExifMetadataReader::new(),
        Arc::new(DecodingPreview::new()),
        Arc::clone(&segmenter),
        Arc::new(ui),
    )
    .with_capture_mode(CaptureMode::CameraOrGallery)
    .with_settle_policy(SettlePolicy::AwaitLoaded {
        timeout: Duration::from_secs(10),
    });

    let task = pipeline.capture().await.ok_or("capture was cancelled")?;
    // the load finishes with a failure, so there is nothing to copy
    assert!(matches!(
        task.outcome().await,
        FrameOutcome::BufferUnavailable
    ));
    assert_eq!(segmenter.call_count(), 0);
    assert!(notifier.messages().is_empty());
    Ok(())
}
