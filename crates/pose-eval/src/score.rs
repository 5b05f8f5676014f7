//! Running OKS score accumulation and mAP reduction.
//!
//! [`RunningScore`] is fed one image at a time and reduced exactly once by
//! [`RunningScore::finalize`], which consumes it.

use std::cmp::Ordering;
use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{EvalError, Result};
use crate::matching::greedy_match;
use crate::oks::{compute_oks, OksMatrix};
use crate::params::Params;
use crate::types::{ImageAnnotation, ImagePrediction};

/// A prediction as recorded by the accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoredDetection {
    score: f64,
    /// OKS of the match this prediction received, if any.
    oks: Option<f64>,
}

/// True positive / false positive / false negative totals at one OKS threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl Counts {
    /// `tp / (tp + fp)`, `None` without predictions.
    pub fn precision(&self) -> Option<f64> {
        let d = self.tp + self.fp;
        (d > 0).then(|| self.tp as f64 / d as f64)
    }

    /// `tp / (tp + fn)`, `None` without ground truth.
    pub fn recall(&self) -> Option<f64> {
        let d = self.tp + self.fn_;
        (d > 0).then(|| self.tp as f64 / d as f64)
    }
}

/// Accumulates per-image match results across an evaluation run.
#[derive(Debug, Clone)]
pub struct RunningScore {
    params: Params,
    num_images: usize,
    /// Every ground-truth instance seen, degenerate ones included.
    num_gt: usize,
    detections: Vec<ScoredDetection>,
}

impl RunningScore {
    /// Start an empty accumulator. Fails if `params` does not validate.
    pub fn new(params: Params) -> Result<Self> {
        params.validate()?;
        Ok(RunningScore {
            params,
            num_images: 0,
            num_gt: 0,
            detections: Vec::new(),
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn num_images(&self) -> usize {
        self.num_images
    }

    pub fn num_gt(&self) -> usize {
        self.num_gt
    }

    pub fn num_pred(&self) -> usize {
        self.detections.len()
    }

    /// Both sides must be in the configured frame.
    fn check_frames(&self, gt: &ImageAnnotation, pred: &ImagePrediction) -> Result<()> {
        if gt.frame != pred.frame {
            return Err(EvalError::FrameMismatch {
                gt: gt.frame,
                pred: pred.frame,
            });
        }
        if gt.frame != self.params.frame {
            return Err(EvalError::UnexpectedFrame {
                expected: self.params.frame,
                got: gt.frame,
            });
        }
        Ok(())
    }

    fn validate(
        &self,
        gt: &ImageAnnotation,
        pred: &ImagePrediction,
        oks: &OksMatrix,
    ) -> Result<()> {
        self.check_frames(gt, pred)?;
        if oks.rows() != gt.len() || oks.cols() != pred.len() {
            return Err(EvalError::shape(
                format!("{}x{} OKS matrix", gt.len(), pred.len()),
                format!("{}x{}", oks.rows(), oks.cols()),
            ));
        }
        if let Some((gt, pred, value)) = oks.find_out_of_range() {
            return Err(EvalError::OksOutOfRange { gt, pred, value });
        }
        Ok(())
    }

    /// Apply one already-validated image.
    fn record(&mut self, gt: &ImageAnnotation, pred: &ImagePrediction, oks: &OksMatrix) {
        let result = greedy_match(oks, self.params.match_threshold);
        let mut matched: Vec<Option<f64>> = vec![None; pred.len()];
        for m in &result.matches {
            matched[m.pred] = Some(m.oks);
        }
        self.detections.extend(
            pred.detections
                .iter()
                .zip(matched)
                .map(|(d, oks)| ScoredDetection {
                    score: d.score,
                    oks,
                }),
        );
        self.num_gt += gt.len();
        self.num_images += 1;
        tracing::debug!(
            image = self.num_images,
            num_gt = gt.len(),
            num_pred = pred.len(),
            num_matches = result.matches.len(),
            "recorded image"
        );
    }

    /// Add one image given its precomputed OKS matrix.
    ///
    /// The update is all-or-nothing: on error the accumulator is unchanged.
    pub fn update(
        &mut self,
        gt: &ImageAnnotation,
        pred: &ImagePrediction,
        oks: &OksMatrix,
    ) -> Result<()> {
        self.validate(gt, pred, oks)?;
        self.record(gt, pred, oks);
        Ok(())
    }

    /// Add a batch of images. Every image is validated before any is applied.
    pub fn update_batch(
        &mut self,
        gts: &[ImageAnnotation],
        preds: &[ImagePrediction],
        oks: &[OksMatrix],
    ) -> Result<()> {
        if gts.len() != preds.len() || gts.len() != oks.len() {
            return Err(EvalError::BatchLength {
                gts: gts.len(),
                preds: preds.len(),
                oks: oks.len(),
            });
        }
        for ((gt, pred), m) in gts.iter().zip(preds).zip(oks) {
            self.validate(gt, pred, m)?;
        }
        for ((gt, pred), m) in gts.iter().zip(preds).zip(oks) {
            self.record(gt, pred, m);
        }
        Ok(())
    }

    /// Compute OKS for one image with this accumulator's params and add it.
    pub fn add_image(&mut self, gt: &ImageAnnotation, pred: &ImagePrediction) -> Result<()> {
        self.check_frames(gt, pred)?;
        let oks = compute_oks(gt, pred, &self.params)?;
        self.record(gt, pred, &oks);
        Ok(())
    }

    /// Score many images in parallel, then fold them in input order.
    ///
    /// All-or-nothing: the first failing image aborts the whole call.
    pub fn extend_par(&mut self, images: &[(ImageAnnotation, ImagePrediction)]) -> Result<()> {
        let this = &*self;
        let matrices: Vec<OksMatrix> = images
            .par_iter()
            .map(|(gt, pred)| {
                this.check_frames(gt, pred)?;
                compute_oks(gt, pred, &this.params)
            })
            .collect::<Result<_>>()?;
        for ((gt, pred), oks) in images.iter().zip(&matrices) {
            self.record(gt, pred, oks);
        }
        Ok(())
    }

    /// Fold another accumulator, e.g. a worker's shard, into this one.
    ///
    /// Both must have been built with the same params.
    pub fn merge(&mut self, other: RunningScore) -> Result<()> {
        if self.params != other.params {
            return Err(EvalError::InvalidParams(
                "cannot merge scores computed with different params".into(),
            ));
        }
        self.num_images += other.num_images;
        self.num_gt += other.num_gt;
        self.detections.extend(other.detections);
        Ok(())
    }

    /// Running totals at one OKS threshold.
    pub fn counts(&self, oks_thr: f64) -> Counts {
        let tp = self
            .detections
            .iter()
            .filter(|d| d.oks.is_some_and(|v| v >= oks_thr))
            .count();
        Counts {
            tp,
            fp: self.detections.len() - tp,
            fn_: self.num_gt - tp,
        }
    }

    /// Reduce to per-threshold AP and mAP. Consumes the accumulator.
    pub fn finalize(self) -> ScoreSummary {
        // Rank by confidence; equal confidences put unmatched detections
        // first, then ascending OKS. Independent of insertion order.
        let mut dets = self.detections;
        dets.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| match (a.oks, b.oks) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                })
        });

        let num_gt = self.num_gt;
        let rec_thrs = &self.params.rec_thrs;
        let thresholds: Vec<ThresholdScore> = self
            .params
            .oks_thrs
            .iter()
            .map(|&thr| {
                let mut tp = 0usize;
                let mut fp = 0usize;
                let mut rc = Vec::with_capacity(dets.len());
                let mut pr = Vec::with_capacity(dets.len());
                for d in &dets {
                    if d.oks.is_some_and(|v| v >= thr) {
                        tp += 1;
                    } else {
                        fp += 1;
                    }
                    rc.push(tp as f64 / num_gt.max(1) as f64);
                    pr.push(tp as f64 / (tp + fp) as f64);
                }
                let counts = Counts {
                    tp,
                    fp,
                    fn_: num_gt - tp,
                };

                let ap = if num_gt == 0 {
                    -1.0
                } else {
                    for i in (0..pr.len().saturating_sub(1)).rev() {
                        pr[i] = pr[i].max(pr[i + 1]);
                    }
                    let sum: f64 = rec_thrs
                        .iter()
                        .map(|&r| {
                            rc.iter()
                                .position(|&c| c >= r)
                                .map_or(0.0, |pos| pr[pos])
                        })
                        .sum();
                    sum / rec_thrs.len() as f64
                };

                ThresholdScore {
                    oks_thr: thr,
                    ap,
                    precision: counts.precision().unwrap_or(-1.0),
                    recall: counts.recall().unwrap_or(-1.0),
                    counts,
                }
            })
            .collect();

        let defined: Vec<f64> = thresholds
            .iter()
            .map(|t| t.ap)
            .filter(|&ap| ap >= 0.0)
            .collect();
        let map = if defined.is_empty() {
            -1.0
        } else {
            defined.iter().sum::<f64>() / defined.len() as f64
        };

        ScoreSummary {
            map,
            thresholds,
            num_images: self.num_images,
            num_gt,
            num_pred: dets.len(),
        }
    }

    /// Shorthand for `finalize().map`.
    pub fn get_map(self) -> f64 {
        self.finalize().map
    }
}

/// Result at one OKS threshold. Undefined values are reported as `-1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdScore {
    pub oks_thr: f64,
    /// 101-point interpolated average precision.
    pub ap: f64,
    pub precision: f64,
    pub recall: f64,
    pub counts: Counts,
}

/// Finalized evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSummary {
    /// Mean of the per-threshold APs; `-1` when no ground truth was seen.
    pub map: f64,
    pub thresholds: Vec<ThresholdScore>,
    pub num_images: usize,
    pub num_gt: usize,
    pub num_pred: usize,
}

impl ScoreSummary {
    fn at(&self, thr: f64) -> Option<&ThresholdScore> {
        self.thresholds
            .iter()
            .find(|t| (t.oks_thr - thr).abs() < 1e-9)
    }

    /// AP at a configured threshold.
    pub fn ap_at(&self, thr: f64) -> Option<f64> {
        self.at(thr).map(|t| t.ap)
    }

    /// Mean recall over all thresholds; `-1` when undefined.
    pub fn mean_recall(&self) -> f64 {
        let defined: Vec<f64> = self
            .thresholds
            .iter()
            .map(|t| t.recall)
            .filter(|&r| r >= 0.0)
            .collect();
        if defined.is_empty() {
            -1.0
        } else {
            defined.iter().sum::<f64>() / defined.len() as f64
        }
    }

    /// `[mAP, AP@.50, AP@.75, AR, AR@.50, AR@.75]`, `-1` where unavailable.
    pub fn stats(&self) -> Vec<f64> {
        let recall_at = |thr| self.at(thr).map_or(-1.0, |t| t.recall);
        vec![
            self.map,
            self.ap_at(0.5).unwrap_or(-1.0),
            self.ap_at(0.75).unwrap_or(-1.0),
            self.mean_recall(),
            recall_at(0.5),
            recall_at(0.75),
        ]
    }

    fn oks_range(&self) -> String {
        let lo = self.thresholds.iter().map(|t| t.oks_thr).fold(f64::INFINITY, f64::min);
        let hi = self
            .thresholds
            .iter()
            .map(|t| t.oks_thr)
            .fold(f64::NEG_INFINITY, f64::max);
        if (hi - lo).abs() < 1e-9 {
            format!("{:.2}", lo)
        } else {
            format!("{:.2}:{:.2}", lo, hi)
        }
    }
}

fn summary_line(f: &mut fmt::Formatter<'_>, ap: bool, oks: &str, val: f64) -> fmt::Result {
    let (name, short) = if ap {
        ("Average Precision", "AP")
    } else {
        ("Average Recall", "AR")
    };
    let val = if val < 0.0 { -1.0 } else { val };
    writeln!(f, " {:<18} ({}) @[ OKS={:<9} ] = {:0.3}", name, short, oks, val)
}

impl fmt::Display for ScoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = self.oks_range();
        summary_line(f, true, &range, self.map)?;
        for thr in [0.5, 0.75] {
            if let Some(t) = self.at(thr) {
                summary_line(f, true, &format!("{:.2}", thr), t.ap)?;
            }
        }
        summary_line(f, false, &range, self.mean_recall())?;
        for thr in [0.5, 0.75] {
            if let Some(t) = self.at(thr) {
                summary_line(f, false, &format!("{:.2}", thr), t.recall)?;
            }
        }
        write!(
            f,
            "images: {} | ground truth: {} | predictions: {}",
            self.num_images, self.num_gt, self.num_pred
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detection, Frame, KeypointSet};

    fn square(x: f64, y: f64, s: f64) -> KeypointSet {
        KeypointSet::new([[x, y], [x + s, y], [x + s, y + s], [x, y + s]])
    }

    fn gt(sets: Vec<KeypointSet>) -> ImageAnnotation {
        ImageAnnotation::new(Frame::default(), sets)
    }

    fn pred(sets: Vec<KeypointSet>) -> ImagePrediction {
        ImagePrediction::from_sets(Frame::default(), sets)
    }

    fn scored(dets: Vec<(KeypointSet, f64)>) -> ImagePrediction {
        ImagePrediction::new(
            Frame::default(),
            dets.into_iter().map(|(k, s)| Detection::new(k, s)).collect(),
        )
    }

    #[test]
    fn test_zero_gt_three_predictions() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let p = pred(vec![square(0.0, 0.0, 10.0); 3]);
        score.update(&gt(vec![]), &p, &OksMatrix::zeros(0, 3)).unwrap();
        let c = score.counts(0.5);
        assert_eq!(c, Counts { tp: 0, fp: 3, fn_: 0 });
    }

    #[test]
    fn test_zero_predictions() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let g = gt(vec![square(0.0, 0.0, 10.0); 2]);
        score.update(&g, &pred(vec![]), &OksMatrix::zeros(2, 0)).unwrap();
        assert_eq!(score.counts(0.5), Counts { tp: 0, fp: 0, fn_: 2 });
        assert_eq!(score.get_map(), 0.0);
    }

    #[test]
    fn test_perfect_run_is_one() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        for i in 0..5 {
            let a = square(10.0 * i as f64, 20.0, 30.0);
            let b = square(200.0, 100.0 + i as f64, 50.0);
            score.add_image(&gt(vec![a, b]), &pred(vec![b, a])).unwrap();
        }
        let summary = score.finalize();
        assert_eq!(summary.map, 1.0);
        assert_eq!(summary.num_images, 5);
        assert_eq!(summary.num_gt, 10);
        assert!(summary.thresholds.iter().all(|t| t.ap == 1.0 && t.recall == 1.0));
    }

    #[test]
    fn test_update_rejects_bad_matrix_atomically() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let a = square(0.0, 0.0, 10.0);
        score.add_image(&gt(vec![a]), &pred(vec![a])).unwrap();

        let err = score
            .update(&gt(vec![a, a]), &pred(vec![a]), &OksMatrix::zeros(1, 1))
            .unwrap_err();
        assert!(matches!(err, EvalError::ShapeMismatch { .. }));
        assert_eq!(score.num_images(), 1);
        assert_eq!(score.num_gt(), 1);
        assert_eq!(score.num_pred(), 1);
    }

    #[test]
    fn test_update_batch_is_all_or_nothing() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let a = square(0.0, 0.0, 10.0);
        let gts = vec![gt(vec![a]), gt(vec![a])];
        let preds = vec![pred(vec![a]), pred(vec![a])];
        let oks = vec![
            OksMatrix::from_rows(&[vec![1.0]]).unwrap(),
            OksMatrix::zeros(2, 1),
        ];
        assert!(score.update_batch(&gts, &preds, &oks).is_err());
        assert_eq!(score.num_images(), 0);

        assert!(matches!(
            score.update_batch(&gts, &preds, &oks[..1]),
            Err(EvalError::BatchLength { .. })
        ));

        let oks = vec![
            OksMatrix::from_rows(&[vec![1.0]]).unwrap(),
            OksMatrix::from_rows(&[vec![1.0]]).unwrap(),
        ];
        score.update_batch(&gts, &preds, &oks).unwrap();
        assert_eq!(score.num_images(), 2);
        assert_eq!(score.counts(0.95).tp, 2);
    }

    #[test]
    fn test_threshold_splits_weak_match() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let a = square(0.0, 0.0, 10.0);
        let oks = OksMatrix::from_rows(&[vec![0.6]]).unwrap();
        score.update(&gt(vec![a]), &pred(vec![a]), &oks).unwrap();
        assert_eq!(score.counts(0.5), Counts { tp: 1, fp: 0, fn_: 0 });
        assert_eq!(score.counts(0.75), Counts { tp: 0, fp: 1, fn_: 1 });
    }

    #[test]
    fn test_single_threshold_map() {
        let mut score = RunningScore::new(Params::single_threshold(0.5)).unwrap();
        let a = square(0.0, 0.0, 10.0);
        let oks = OksMatrix::from_rows(&[vec![0.6]]).unwrap();
        score.update(&gt(vec![a]), &pred(vec![a]), &oks).unwrap();
        let summary = score.finalize();
        assert_eq!(summary.thresholds.len(), 1);
        assert_eq!(summary.map, 1.0);
    }

    #[test]
    fn test_half_recall_ap() {
        // One of two ground truths found, no false positives: precision 1 up
        // to recall 0.5, so 51 of 101 recall samples score 1.
        let mut score = RunningScore::new(Params::single_threshold(0.5)).unwrap();
        let a = square(0.0, 0.0, 10.0);
        let b = square(100.0, 100.0, 10.0);
        score.add_image(&gt(vec![a, b]), &pred(vec![a])).unwrap();
        let map = score.get_map();
        assert!((map - 51.0 / 101.0).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_ranking() {
        // A high-confidence false positive ranked ahead of the true positive
        // caps precision at 0.5.
        let mut score = RunningScore::new(Params::single_threshold(0.5)).unwrap();
        let a = square(0.0, 0.0, 10.0);
        let far = square(300.0, 300.0, 10.0);
        score
            .add_image(&gt(vec![a]), &scored(vec![(far, 0.9), (a, 0.4)]))
            .unwrap();
        let map = score.get_map();
        assert!((map - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_no_ground_truth_is_undefined() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        score
            .add_image(&gt(vec![]), &pred(vec![square(0.0, 0.0, 5.0)]))
            .unwrap();
        let summary = score.finalize();
        assert_eq!(summary.map, -1.0);
        assert!(summary.thresholds.iter().all(|t| t.ap == -1.0));
        assert_eq!(summary.thresholds[0].precision, 0.0);
    }

    #[test]
    fn test_degenerate_gt_counts_toward_recall() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let a = square(0.0, 0.0, 10.0);
        score
            .add_image(&gt(vec![a, KeypointSet::sentinel()]), &pred(vec![a]))
            .unwrap();
        assert_eq!(score.counts(0.5), Counts { tp: 1, fp: 0, fn_: 1 });
    }

    #[test]
    fn test_equal_score_false_positives_lower_ap() {
        let a = square(0.0, 0.0, 10.0);
        let far = square(300.0, 300.0, 10.0);
        for preds in [vec![far, far, far, a], vec![a, far, far, far]] {
            let mut score = RunningScore::new(Params::new()).unwrap();
            score.add_image(&gt(vec![a]), &pred(preds)).unwrap();
            assert_eq!(score.counts(0.5), Counts { tp: 1, fp: 3, fn_: 0 });
            let map = score.get_map();
            assert!((map - 0.25).abs() < 1e-12, "mAP {map}");
        }
    }

    #[test]
    fn test_equal_score_lower_oks_ranks_first() {
        // Two matches with equal confidence: the weaker one ranks first, so at
        // 0.75 the run opens with a false positive.
        let mut score = RunningScore::new(Params::single_threshold(0.75)).unwrap();
        let a = square(0.0, 0.0, 10.0);
        let b = square(100.0, 100.0, 10.0);
        let oks = OksMatrix::from_rows(&[vec![0.9, 0.0], vec![0.0, 0.6]]).unwrap();
        score.update(&gt(vec![a, b]), &pred(vec![a, b]), &oks).unwrap();
        let map = score.get_map();
        // precision 0.5 up to recall 0.5, nothing beyond
        assert!((map - 51.0 * 0.5 / 101.0).abs() < 1e-12, "mAP {map}");
    }

    #[test]
    fn test_update_rejects_out_of_range_oks() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let a = square(0.0, 0.0, 10.0);
        for bad in [7.5, -0.1, f64::NAN, f64::INFINITY] {
            let oks = OksMatrix::from_rows(&[vec![bad]]).unwrap();
            let err = score.update(&gt(vec![a]), &pred(vec![a]), &oks).unwrap_err();
            assert!(matches!(err, EvalError::OksOutOfRange { gt: 0, pred: 0, .. }));
        }
        assert_eq!(score.num_images(), 0);
        assert_eq!(score.num_pred(), 0);

        let gts = vec![gt(vec![a]), gt(vec![a])];
        let preds = vec![pred(vec![a]), pred(vec![a])];
        let oks = vec![
            OksMatrix::from_rows(&[vec![1.0]]).unwrap(),
            OksMatrix::from_rows(&[vec![1.5]]).unwrap(),
        ];
        assert!(score.update_batch(&gts, &preds, &oks).is_err());
        assert_eq!(score.num_images(), 0);
    }

    #[test]
    fn test_new_rejects_invalid_params() {
        let mut params = Params::new();
        params.rec_thrs.clear();
        assert!(matches!(
            RunningScore::new(params),
            Err(EvalError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_rejects_images_outside_configured_frame() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let a = square(0.0, 0.0, 10.0);
        let frame = Frame::new(320, 320);
        let g = ImageAnnotation::new(frame, vec![a]);
        let p = ImagePrediction::from_sets(frame, vec![a]);

        let err = score.add_image(&g, &p).unwrap_err();
        assert!(matches!(err, EvalError::UnexpectedFrame { .. }));
        let oks = OksMatrix::from_rows(&[vec![1.0]]).unwrap();
        assert!(matches!(
            score.update(&g, &p, &oks),
            Err(EvalError::UnexpectedFrame { .. })
        ));
        assert!(score.extend_par(&[(g, p)]).is_err());
        assert_eq!(score.num_images(), 0);
    }

    #[test]
    fn test_merge_order_independent() {
        let a = square(0.0, 0.0, 10.0);
        let near = square(0.5, 0.0, 10.0);
        let far = square(300.0, 300.0, 10.0);
        let images = vec![
            (gt(vec![a]), pred(vec![near])),
            (gt(vec![a]), pred(vec![far])),
            (gt(vec![a, far]), pred(vec![a, near])),
        ];

        let mut forward = RunningScore::new(Params::new()).unwrap();
        for (g, p) in &images {
            let mut shard = RunningScore::new(Params::new()).unwrap();
            shard.add_image(g, p).unwrap();
            forward.merge(shard).unwrap();
        }
        let mut backward = RunningScore::new(Params::new()).unwrap();
        for (g, p) in images.iter().rev() {
            let mut shard = RunningScore::new(Params::new()).unwrap();
            shard.add_image(g, p).unwrap();
            backward.merge(shard).unwrap();
        }
        assert_eq!(forward.finalize(), backward.finalize());
    }

    #[test]
    fn test_merge_rejects_different_params() {
        let mut a = RunningScore::new(Params::new()).unwrap();
        let b = RunningScore::new(Params::single_threshold(0.5)).unwrap();
        assert!(a.merge(b).is_err());
    }

    #[test]
    fn test_extend_par_matches_sequential() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(1.0, 1.0, 10.0);
        let images: Vec<_> = (0..16)
            .map(|i| {
                let p = if i % 3 == 0 { vec![b] } else { vec![a, b] };
                (gt(vec![a]), pred(p))
            })
            .collect();

        let mut seq = RunningScore::new(Params::new()).unwrap();
        for (g, p) in &images {
            seq.add_image(g, p).unwrap();
        }
        let mut par = RunningScore::new(Params::new()).unwrap();
        par.extend_par(&images).unwrap();
        assert_eq!(seq.finalize(), par.finalize());
    }

    #[test]
    fn test_extend_par_all_or_nothing() {
        let a = square(0.0, 0.0, 10.0);
        let images = vec![
            (gt(vec![a]), pred(vec![a])),
            (
                gt(vec![a]),
                ImagePrediction::from_sets(Frame::new(320, 320), vec![a]),
            ),
        ];
        let mut score = RunningScore::new(Params::new()).unwrap();
        assert!(score.extend_par(&images).is_err());
        assert_eq!(score.num_images(), 0);
    }

    #[test]
    fn test_summary_display_and_stats() {
        let mut score = RunningScore::new(Params::new()).unwrap();
        let a = square(0.0, 0.0, 10.0);
        score.add_image(&gt(vec![a]), &pred(vec![a])).unwrap();
        let summary = score.finalize();
        let text = summary.to_string();
        assert!(text.contains(" Average Precision  (AP) @[ OKS=0.50:0.95 ] = 1.000"));
        assert!(text.contains(" Average Recall     (AR) @[ OKS=0.75      ] = 1.000"));
        assert_eq!(summary.stats(), vec![1.0; 6]);
    }
}
