//! Error types for the pose-eval crate.

use crate::types::Frame;

/// Errors raised while scoring keypoint detections.
///
/// Empty inputs and degenerate (sentinel-only) keypoint sets are valid and
/// never produce an error.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Coordinates are not grouped as 4 `(x, y)` pairs, or a matrix / score
    /// list does not line up with the instances it describes.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// Ground truth and predictions are expressed in different pixel frames.
    #[error("frame mismatch: ground truth is {gt}, predictions are {pred}")]
    FrameMismatch { gt: Frame, pred: Frame },

    /// Batched inputs have different lengths.
    #[error("batch length mismatch: {gts} ground truths, {preds} predictions, {oks} OKS matrices")]
    BatchLength { gts: usize, preds: usize, oks: usize },

    /// An image is expressed in a different frame than the accumulator's params.
    #[error("frame {got} does not match the configured frame {expected}")]
    UnexpectedFrame { expected: Frame, got: Frame },

    /// A precomputed OKS value is non-finite or outside `[0, 1]`.
    #[error("OKS value {value} at ({gt}, {pred}) is outside [0, 1]")]
    OksOutOfRange { gt: usize, pred: usize, value: f64 },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// A label file line could not be parsed.
    #[error("label parse error at line {line}: {reason}")]
    LabelParse { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EvalError {
    pub(crate) fn shape(expected: impl Into<String>, got: impl Into<String>) -> Self {
        EvalError::ShapeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
