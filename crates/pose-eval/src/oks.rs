//! Object keypoint similarity between ground-truth and predicted landmark sets.

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::matching::{greedy_match, MatchResult};
use crate::params::Params;
use crate::types::{ImageAnnotation, ImagePrediction, KeypointSet, NUM_KEYPOINTS};

/// Dense OKS matrix for one image: rows are ground truth, columns are predictions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawOksMatrix")]
pub struct OksMatrix {
    rows: usize,
    cols: usize,
    /// Row-major values, `rows * cols` long.
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawOksMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl TryFrom<RawOksMatrix> for OksMatrix {
    type Error = EvalError;

    fn try_from(raw: RawOksMatrix) -> Result<Self> {
        if raw.rows.checked_mul(raw.cols) != Some(raw.values.len()) {
            return Err(EvalError::shape(
                format!("values for a {}x{} matrix", raw.rows, raw.cols),
                format!("{}", raw.values.len()),
            ));
        }
        Ok(OksMatrix {
            rows: raw.rows,
            cols: raw.cols,
            values: raw.values,
        })
    }
}

impl OksMatrix {
    /// An all-zero `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        OksMatrix {
            rows,
            cols,
            values: vec![0.0; rows * cols],
        }
    }

    /// Build from nested rows; every row must have the same length.
    ///
    /// A matrix built from zero rows has zero columns.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(EvalError::shape(
                format!("rows of length {cols}"),
                format!("a row of length {}", bad.len()),
            ));
        }
        Ok(OksMatrix {
            rows: rows.len(),
            cols,
            values: rows.concat(),
        })
    }

    /// Build from nested rows with an explicit column count, so that an image
    /// with zero ground truth still remembers how many predictions it had.
    pub fn from_rows_with_cols(rows: &[Vec<f64>], cols: usize) -> Result<Self> {
        if rows.is_empty() {
            return Ok(Self::zeros(0, cols));
        }
        let m = Self::from_rows(rows)?;
        if m.cols != cols {
            return Err(EvalError::shape(
                format!("{cols} columns"),
                format!("{}", m.cols),
            ));
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First entry that is not a finite value in `[0, 1]`, as `(gt, pred, value)`.
    pub fn find_out_of_range(&self) -> Option<(usize, usize, f64)> {
        self.values
            .iter()
            .position(|v| !(0.0..=1.0).contains(v))
            .map(|i| (i / self.cols, i % self.cols, self.values[i]))
    }

    #[inline]
    fn idx(&self, gt: usize, pred: usize) -> usize {
        gt * self.cols + pred
    }

    /// OKS between ground truth `gt` and prediction `pred`.
    ///
    /// Panics if either index is out of range.
    pub fn get(&self, gt: usize, pred: usize) -> f64 {
        assert!(gt < self.rows && pred < self.cols, "OKS index out of range");
        self.values[self.idx(gt, pred)]
    }

    fn set(&mut self, gt: usize, pred: usize, v: f64) {
        let i = self.idx(gt, pred);
        self.values[i] = v;
    }

    pub fn row(&self, gt: usize) -> &[f64] {
        &self.values[gt * self.cols..(gt + 1) * self.cols]
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|i| self.row(i).to_vec()).collect()
    }
}

/// OKS of a single (ground truth, prediction) pair.
///
/// Returns 0 for degenerate sets and for ground truth with zero extent. Only
/// ground-truth landmarks that are not sentinels contribute.
pub fn keypoint_oks(gt: &KeypointSet, dt: &KeypointSet, falloffs: &[f64; NUM_KEYPOINTS]) -> f64 {
    if gt.is_degenerate() || dt.is_degenerate() {
        return 0.0;
    }
    let area = gt.area();
    if area == 0.0 {
        return 0.0;
    }

    let mut oks = 0.0;
    let mut valid = 0;
    for ((g, d), &k) in gt.points.iter().zip(dt.points.iter()).zip(falloffs) {
        if g.is_sentinel() {
            continue;
        }
        let e = g.dist_sq(d) / (2.0 * area * k * k);
        oks += (-e).exp();
        valid += 1;
    }

    if valid > 0 {
        oks / valid as f64
    } else {
        0.0
    }
}

/// Compute the `m x n` OKS matrix between one image's ground truth and predictions.
///
/// Either side being empty yields an empty matrix with the other dimension
/// preserved. Both sides must be expressed in the same frame.
pub fn compute_oks(
    gt: &ImageAnnotation,
    pred: &ImagePrediction,
    params: &Params,
) -> Result<OksMatrix> {
    if gt.frame != pred.frame {
        return Err(EvalError::FrameMismatch {
            gt: gt.frame,
            pred: pred.frame,
        });
    }

    let mut result = OksMatrix::zeros(gt.len(), pred.len());
    if result.is_empty() {
        return Ok(result);
    }

    for (i, g) in gt.sets.iter().enumerate() {
        for (j, d) in pred.detections.iter().enumerate() {
            result.set(i, j, keypoint_oks(g, &d.keypoints, &params.kpt_falloffs));
        }
    }
    Ok(result)
}

/// Per-image comparison result.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEval {
    pub oks: OksMatrix,
    pub matches: MatchResult,
}

/// Score one image: OKS matrix plus greedy assignment at `params.match_threshold`.
pub fn compare_image(
    gt: &ImageAnnotation,
    pred: &ImagePrediction,
    params: &Params,
) -> Result<ImageEval> {
    let oks = compute_oks(gt, pred, params)?;
    let matches = greedy_match(&oks, params.match_threshold);
    tracing::debug!(
        num_gt = gt.len(),
        num_pred = pred.len(),
        num_matches = matches.matches.len(),
        "compared image"
    );
    Ok(ImageEval { oks, matches })
}
