use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::types::{Frame, NUM_KEYPOINTS};

/// Evaluation parameters controlling OKS thresholds, recall sampling and the
/// OKS kernel.
///
/// Defaults follow COCO keypoint evaluation: 10 OKS thresholds
/// (0.50:0.05:0.95) and 101 recall thresholds. Every field may be omitted
/// when loading from JSON.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Params {
    /// OKS thresholds at which a match counts as a true positive.
    pub oks_thrs: Vec<f64>,
    /// Recall thresholds for interpolated precision (default: 0.00, 0.01, ..., 1.00).
    pub rec_thrs: Vec<f64>,
    /// Per-keypoint falloff constants `k` in `exp(-d^2 / (2 s^2 k^2))`.
    pub kpt_falloffs: [f64; NUM_KEYPOINTS],
    /// Pairs scoring below this are never matched.
    pub match_threshold: f64,
    /// Reference frame ground truth and predictions are rescaled into.
    pub frame: Frame,
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}

impl Params {
    pub fn new() -> Self {
        let oks_thrs: Vec<f64> = (0..10).map(|i| 0.5 + 0.05 * i as f64).collect();
        let rec_thrs: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();

        Params {
            oks_thrs,
            rec_thrs,
            kpt_falloffs: [0.1; NUM_KEYPOINTS],
            match_threshold: 0.0,
            frame: Frame::default(),
        }
    }

    /// Parameters that score at one OKS threshold instead of the sweep.
    pub fn single_threshold(thr: f64) -> Self {
        Params {
            oks_thrs: vec![thr],
            ..Self::new()
        }
    }

    /// Load a (possibly partial) JSON parameter file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let params: Params = serde_json::from_reader(reader)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.oks_thrs.is_empty() {
            return Err(EvalError::InvalidParams("oks_thrs is empty".into()));
        }
        if self.rec_thrs.is_empty() {
            return Err(EvalError::InvalidParams("rec_thrs is empty".into()));
        }
        let in_unit = |v: &f64| (0.0..=1.0).contains(v);
        if let Some(t) = self.oks_thrs.iter().find(|t| !in_unit(*t)) {
            return Err(EvalError::InvalidParams(format!(
                "OKS threshold {t} outside [0, 1]"
            )));
        }
        if let Some(r) = self.rec_thrs.iter().find(|r| !in_unit(*r)) {
            return Err(EvalError::InvalidParams(format!(
                "recall threshold {r} outside [0, 1]"
            )));
        }
        if !in_unit(&self.match_threshold) {
            return Err(EvalError::InvalidParams(format!(
                "match threshold {} outside [0, 1]",
                self.match_threshold
            )));
        }
        if let Some(k) = self.kpt_falloffs.iter().find(|k| !(**k > 0.0)) {
            return Err(EvalError::InvalidParams(format!(
                "keypoint falloff {k} must be positive"
            )));
        }
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(EvalError::InvalidParams(format!(
                "frame {} has zero extent",
                self.frame
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Params::new();
        assert_eq!(p.oks_thrs.len(), 10);
        assert!((p.oks_thrs[0] - 0.5).abs() < 1e-12);
        assert!((p.oks_thrs[9] - 0.95).abs() < 1e-12);
        assert_eq!(p.rec_thrs.len(), 101);
        assert_eq!(p.rec_thrs[100], 1.0);
        assert_eq!(p.frame, Frame::new(640, 400));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_single_threshold() {
        let p = Params::single_threshold(0.75);
        assert_eq!(p.oks_thrs, vec![0.75]);
        assert_eq!(p.rec_thrs.len(), 101);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut p = Params::new();
        p.oks_thrs = vec![1.5];
        assert!(p.validate().is_err());

        let mut p = Params::new();
        p.kpt_falloffs[3] = 0.0;
        assert!(p.validate().is_err());

        let mut p = Params::new();
        p.frame = Frame::new(0, 400);
        assert!(p.validate().is_err());

        let mut p = Params::new();
        p.oks_thrs.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let p: Params =
            serde_json::from_str(r#"{"oks_thrs": [0.5], "frame": {"width": 320, "height": 320}}"#)
                .unwrap();
        assert_eq!(p.oks_thrs, vec![0.5]);
        assert_eq!(p.frame, Frame::new(320, 320));
        assert_eq!(p.rec_thrs.len(), 101);
        assert_eq!(p.kpt_falloffs, [0.1; 4]);
    }
}
