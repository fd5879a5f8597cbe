use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::acquire::{CaptureMode, ImageHandle};
use crate::errors::{PhotoSegError, Result};
use crate::materialize::SettlePolicy;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// A captured photo or a directory to pick photos from, as a path or
    /// `file://` URI.
    pub input: String,

    #[arg(short, long)]
    pub model_path: PathBuf,

    /// Class names, one per line. Defaults to the Pascal VOC classes.
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Fixed wait before the preview is copied out.
    #[arg(long, default_value_t = 1000)]
    pub settle_ms: u64,

    /// Wait for the preview to finish loading instead of a fixed delay.
    #[arg(long, default_value_t = false)]
    pub await_loaded: bool,

    #[arg(long, default_value_t = 5000)]
    pub load_timeout_ms: u64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let input = self.input_handle()?;
        if !input.path().exists() {
            return Err(PhotoSegError::Validation {
                field: "input".to_string(),
                reason: format!("{} does not exist", input.path().display()),
            });
        }
        if !self.model_path.is_file() {
            return Err(PhotoSegError::Validation {
                field: "model_path".to_string(),
                reason: format!("{} is not a file", self.model_path.display()),
            });
        }
        if let Some(labels) = &self.labels {
            if !labels.is_file() {
                return Err(PhotoSegError::Validation {
                    field: "labels".to_string(),
                    reason: format!("{} is not a file", labels.display()),
                });
            }
        }
        if self.await_loaded && self.load_timeout_ms == 0 {
            return Err(PhotoSegError::Validation {
                field: "load_timeout_ms".to_string(),
                reason: "must be positive when waiting for the preview".to_string(),
            });
        }
        Ok(())
    }

    pub const fn settle_policy(&self) -> SettlePolicy {
        if self.await_loaded {
            SettlePolicy::AwaitLoaded {
                timeout: Duration::from_millis(self.load_timeout_ms),
            }
        } else {
            SettlePolicy::FixedDelay(Duration::from_millis(self.settle_ms))
        }
    }

    pub fn input_handle(&self) -> Result<ImageHandle> {
        ImageHandle::parse(&self.input)
    }

    /// A directory is browsed like a gallery, a single file is a camera shot.
    pub fn capture_mode(input: &ImageHandle) -> CaptureMode {
        if input.path().is_dir() {
            CaptureMode::GalleryOnly
        } else {
            CaptureMode::CameraOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(input: PathBuf, model_path: PathBuf) -> Config {
        Config {
            input: input.display().to_string(),
            model_path,
            labels: None,
            device_id: 0,
            settle_ms: 1000,
            await_loaded: false,
            load_timeout_ms: 5000,
        }
    }

    #[test]
    fn test_parse_defaults() {
        let config = Config::parse_from(["photo-seg", "photo.jpg", "-m", "model.onnx"]);

        assert_eq!(config.input, "photo.jpg");
        assert_eq!(
            config.settle_policy(),
            SettlePolicy::FixedDelay(Duration::from_secs(1))
        );
        assert!(config.labels.is_none());
    }

    #[test]
    fn test_await_loaded_policy() {
        let config = Config::parse_from([
            "photo-seg",
            "photo.jpg",
            "-m",
            "model.onnx",
            "--await-loaded",
            "--load-timeout-ms",
            "250",
        ]);

        assert_eq!(
            config.settle_policy(),
            SettlePolicy::AwaitLoaded {
                timeout: Duration::from_millis(250)
            }
        );
    }

    #[test]
    fn test_validate() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let model = temp_dir.path().join("model.onnx");
        std::fs::write(&model, b"dummy_model")?;

        let ok = config(temp_dir.path().to_path_buf(), model.clone());
        ok.validate()?;
        assert_eq!(
            Config::capture_mode(&ok.input_handle()?),
            CaptureMode::GalleryOnly
        );

        let missing_input = config(temp_dir.path().join("nope.jpg"), model.clone());
        assert!(matches!(
            missing_input.validate(),
            Err(PhotoSegError::Validation { field, .. }) if field == "input"
        ));

        let missing_model = config(temp_dir.path().to_path_buf(), temp_dir.path().join("x.onnx"));
        assert!(missing_model.validate().is_err());

        let mut zero_timeout = config(temp_dir.path().to_path_buf(), model);
        zero_timeout.await_loaded = true;
        zero_timeout.load_timeout_ms = 0;
        assert!(zero_timeout.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_file_uri_input() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let photo = temp_dir.path().join("My Photo.jpg");
        std::fs::write(&photo, b"jpeg")?;
        let model = temp_dir.path().join("model.onnx");
        std::fs::write(&model, b"dummy_model")?;

        let mut uri_input = config(PathBuf::new(), model);
        uri_input.input = format!("file://{}", photo.display()).replace(' ', "%20");
        uri_input.validate()?;

        let input = uri_input.input_handle()?;
        assert_eq!(input.path(), photo.as_path());
        assert_eq!(Config::capture_mode(&input), CaptureMode::CameraOnly);

        uri_input.input = "file://elsewhere/photo.jpg".to_string();
        assert!(matches!(
            uri_input.validate(),
            Err(PhotoSegError::Validation { field, .. }) if field == "image uri"
        ));
        Ok(())
    }
}
