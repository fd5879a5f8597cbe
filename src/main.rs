use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use photo_seg_rs::model::load_labels;
use photo_seg_rs::segmentation::pascal_voc_labels;
use photo_seg_rs::{
    ui_channel, CaptureMode, Config, ConsoleNotifier, ConsoleRenderer, DecodingPreview,
    ExifMetadataReader, FrameOutcome, OnnxSegmenter, SegmentationPipeline, StagedSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    config.validate()?;

    let labels = match &config.labels {
        Some(path) => load_labels(path)?,
        None => pascal_voc_labels(),
    };
    let segmenter = Arc::new(OnnxSegmenter::new(
        &config.model_path,
        config.device_id,
        labels,
    )?);

    let input = config.input_handle()?;
    let mode = Config::capture_mode(&input);
    let source = match mode {
        CaptureMode::GalleryOnly => StagedSource::scan_directory(input.path())?,
        _ => StagedSource::camera(input.path()),
    };
    let total = source.remaining();
    if total == 0 {
        println!("No images to segment in {}", input.path().display());
        return Ok(());
    }

    let (ui_handle, ui_loop) = ui_channel(ConsoleRenderer::new(), ConsoleNotifier);
    let ui_task = tokio::spawn(ui_loop.run(CancellationToken::new()));

    let pipeline = SegmentationPipeline::new(
        source,
        ExifMetadataReader::new(),
        Arc::new(DecodingPreview::new()),
        segmenter,
        Arc::new(ui_handle),
    )
    .with_settle_policy(config.settle_policy())
    .with_capture_mode(mode);

    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )?
        .progress_chars("#>-"),
    );

    let mut submitted = 0usize;
    while let Some(frame) = pipeline.capture().await {
        match frame.outcome().await {
            FrameOutcome::Submitted(frame) => {
                frame.delivered().await;
                submitted += 1;
            }
            FrameOutcome::BufferUnavailable => {
                debug!("image was not ready after the settle delay, try a longer --settle-ms")
            }
            FrameOutcome::TimedOut(e) => warn!(error = %e, "skipping image"),
            FrameOutcome::ViewDestroyed => break,
        }
        progress_bar.inc(1);
    }
    progress_bar.finish();

    pipeline.shutdown().await;
    drop(pipeline);

    let (renderer, _) = ui_task.await.context("UI loop panicked")?;
    info!(total, submitted, rendered = renderer.frames(), "done");

    Ok(())
}
