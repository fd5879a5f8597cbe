use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::{imageops, imageops::FilterType, GrayImage, Luma, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::buffer::PixelBuffer;
use crate::errors::{PhotoSegError, Result};
use crate::orientation::RotationDegrees;
use crate::segmentation::{
    labels_from_names, regions_from_category_mask, ColoredLabel, SegmentationResult,
};
use crate::traits::ImageSegmenter;

/// Per-pixel classifier backed by an ONNX model.
///
/// Expects one NCHW float input (RGB in `[0, 1]`, square) and one NCHW
/// output of per-class scores at the input resolution.
#[derive(Clone)]
pub struct OnnxSegmenter {
    inner: Arc<OnnxModel>,
}

struct OnnxModel {
    image_size: u32,
    input_name: String,
    output_name: String,
    labels: Vec<ColoredLabel>,
    session: Mutex<Session>,
}

impl OnnxSegmenter {
    pub fn new(model_path: &Path, device_id: i32, labels: Vec<ColoredLabel>) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| PhotoSegError::model("session builder initialization", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| PhotoSegError::model("execution provider setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| PhotoSegError::model("memory pattern setup", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                PhotoSegError::model(format!("model load: {}", model_path.display()), e)
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| PhotoSegError::model("model input lookup", "model has no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| PhotoSegError::model("model output lookup", "model has no outputs"))?;
        check_label_count(
            labels.len(),
            session.outputs[0]
                .output_type
                .tensor_shape()
                .and_then(|shape| shape.get(1).copied()),
        )?;

        let image_size = session.inputs[0]
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                PhotoSegError::model("model input shape", "input tensor has no fixed height")
            })? as u32;

        // warm up
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        let warmup = TensorRef::from_array_view(&data)
            .map_err(|e| PhotoSegError::model("warm-up tensor creation", e))?;
        session
            .run(ort::inputs![input_name.as_str() => warmup])
            .map_err(|e| PhotoSegError::model("warm-up run", e))?;

        info!(
            model = %model_path.display(),
            image_size,
            classes = labels.len(),
            "segmentation model ready"
        );

        Ok(Self {
            inner: Arc::new(OnnxModel {
                image_size,
                input_name,
                output_name,
                labels,
                session: Mutex::new(session),
            }),
        })
    }

    pub fn image_size(&self) -> u32 {
        self.inner.image_size
    }

    pub fn labels(&self) -> &[ColoredLabel] {
        &self.inner.labels
    }
}

impl OnnxModel {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut session = self.session.lock();
        let standard = tensor.as_standard_layout();
        let input = TensorRef::from_array_view(&standard)
            .map_err(|e| PhotoSegError::model("input tensor creation", e))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| PhotoSegError::model("inference", e))?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| PhotoSegError::model("output extraction", e))?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }

    fn segment(&self, buffer: PixelBuffer, rotation: RotationDegrees) -> Result<SegmentationResult> {
        let upright = rotation.apply(buffer.into_dynamic()).to_rgb8();
        let (width, height) = upright.dimensions();

        let tensor = preprocess(&upright, self.image_size);
        let started = Instant::now();
        let scores = self.predict(tensor.view())?;
        let inference_time = started.elapsed();

        let category_mask = postprocess_scores(scores.view(), width, height)?;
        let regions = regions_from_category_mask(&category_mask, &self.labels);
        debug!(regions = regions.len(), ?inference_time, "inference done");

        Ok(SegmentationResult {
            regions,
            inference_time,
            image_height: height,
            image_width: width,
        })
    }
}

#[async_trait]
impl ImageSegmenter for OnnxSegmenter {
    async fn segment(
        &self,
        buffer: PixelBuffer,
        rotation: RotationDegrees,
    ) -> Result<SegmentationResult> {
        let model = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || model.segment(buffer, rotation))
            .await
            .map_err(|e| PhotoSegError::model("inference task", e))?
    }
}

/// Labels must name every class the model scores.
///
/// A dynamic class axis (`None` or a negative size) cannot be checked up
/// front; classes past the end of the labels are reported unnamed.
fn check_label_count(labels: usize, model_classes: Option<i64>) -> Result<()> {
    match model_classes {
        Some(classes) if classes > 0 && classes as usize != labels => {
            Err(PhotoSegError::Configuration {
                message: format!(
                    "{labels} class labels configured but the model scores {classes} classes"
                ),
            })
        }
        _ => Ok(()),
    }
}

/// Stretches to the model's square input and lays out as NCHW in `[0, 1]`.
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let resized = imageops::resize(image, image_size, image_size, FilterType::Triangle);
    resized
        .as_ndarray3()
        .slice_move(s![NewAxis, .., .., ..])
        .map(|v| f32::from(*v) / 255.0)
}

/// Arg-max over the class axis, scaled back to `width`×`height`.
pub fn postprocess_scores(scores: ArrayView4<f32>, width: u32, height: u32) -> Result<GrayImage> {
    let (batch, classes, rows, cols) = scores.dim();
    if batch != 1 || classes == 0 || classes > u8::MAX as usize + 1 {
        return Err(PhotoSegError::Validation {
            field: "model output".to_string(),
            reason: format!("unsupported score shape {:?}", scores.shape()),
        });
    }

    let mask = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let pixel = scores.slice(s![0, .., y as usize, x as usize]);
        let (best, _) = pixel.iter().enumerate().fold(
            (0usize, f32::NEG_INFINITY),
            |(best, best_score), (class, &score)| {
                if score > best_score {
                    (class, score)
                } else {
                    (best, best_score)
                }
            },
        );
        Luma([best as u8])
    });

    Ok(imageops::resize(&mask, width, height, FilterType::Nearest))
}

/// Reads class names, one per line; blank lines are skipped.
pub fn load_labels(path: &Path) -> Result<Vec<ColoredLabel>> {
    let text = std::fs::read_to_string(path).map_err(|e| PhotoSegError::FileSystem {
        path: path.to_path_buf(),
        operation: "labels file read".to_string(),
        source: e,
    })?;

    let labels = labels_from_names(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty()),
    );
    if labels.is_empty() {
        return Err(PhotoSegError::Validation {
            field: "labels".to_string(),
            reason: format!("{} contains no class names", path.display()),
        });
    }
    Ok(labels)
}
