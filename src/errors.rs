use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Boxed source error that can cross task boundaries.
///
/// # Why `Send + Sync`
///
/// Decoding and inference fail on tokio's blocking pool, and the error is
/// handed back through a `JoinHandle` to the task that owns the frame.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the photo segmentation pipeline.
///
/// # Why structured errors
///
/// Each variant carries the context of its own domain (filesystem, decoding,
/// inference, settle step) so callers never have to parse error strings.
/// Only `Segmentation` is shown to the user, and it displays its message
/// unchanged.
#[derive(Error, Debug)]
pub enum PhotoSegError {
    /// Settings that are individually valid but do not fit together, such
    /// as a labels file that does not match the model's class count.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: BoxedError,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxedError,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    /// Failure reported by a segmentation collaborator.
    ///
    /// Displays the message alone so it reaches the user verbatim.
    #[error("{message}")]
    Segmentation { message: String },

    /// The preview never reported a finished load under `AwaitLoaded`.
    #[error("Preview did not finish loading within {waited:?}")]
    SettleTimeout { waited: Duration },
}

impl PhotoSegError {
    pub fn segmentation(message: impl Into<String>) -> Self {
        Self::Segmentation {
            message: message.into(),
        }
    }

    pub(crate) fn model(operation: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::Model {
            operation: operation.into(),
            source: source.to_string().into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PhotoSegError>;

/// Convert I/O errors to filesystem errors.
///
/// # Why placeholder context
///
/// `?` on a bare I/O call has no path or operation to attach. Code that
/// knows them builds `PhotoSegError::FileSystem` directly instead.
impl From<std::io::Error> for PhotoSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for PhotoSegError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to model errors.
///
/// Shape errors only occur while reshaping inference tensors, so they are
/// reported against the model.
impl From<ndarray::ShapeError> for PhotoSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segmentation_error_displays_message_verbatim() {
        let err = PhotoSegError::segmentation("Image segmentation failed to initialize");
        assert_eq!(err.to_string(), "Image segmentation failed to initialize");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        match PhotoSegError::from(io) {
            PhotoSegError::FileSystem { operation, .. } => assert_eq!(operation, "unknown"),
            other => panic!("Expected FileSystem error, got {other:?}"),
        }
    }
}
