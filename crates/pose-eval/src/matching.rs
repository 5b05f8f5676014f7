//! Greedy highest-score-first assignment of predictions to ground truth.

use serde::{Deserialize, Serialize};

use crate::oks::OksMatrix;

/// One committed (ground truth, prediction) pair.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Match {
    pub gt: usize,
    pub pred: usize,
    pub oks: f64,
}

/// Outcome of matching one image.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct MatchResult {
    /// Matches in the order they were committed (highest OKS first).
    pub matches: Vec<Match>,
    /// Ground-truth indices left unmatched, ascending.
    pub unmatched_gt: Vec<usize>,
    /// Prediction indices left unmatched, ascending.
    pub unmatched_pred: Vec<usize>,
}

impl MatchResult {
    pub fn false_negatives(&self) -> usize {
        self.unmatched_gt.len()
    }

    pub fn false_positives(&self) -> usize {
        self.unmatched_pred.len()
    }

    /// The match for prediction `pred`, if it has one.
    pub fn for_pred(&self, pred: usize) -> Option<&Match> {
        self.matches.iter().find(|m| m.pred == pred)
    }
}

/// Greedily assign predictions to ground truth.
///
/// Repeatedly takes the highest remaining OKS, ties broken by lowest
/// ground-truth index then lowest prediction index, and removes that row and
/// column. Pairs with OKS of 0 or below `threshold` are never matched.
pub fn greedy_match(oks: &OksMatrix, threshold: f64) -> MatchResult {
    let (m, n) = (oks.rows(), oks.cols());

    let mut candidates: Vec<Match> = Vec::with_capacity(m * n);
    for gt in 0..m {
        for (pred, &v) in oks.row(gt).iter().enumerate() {
            if v > 0.0 && v >= threshold {
                candidates.push(Match { gt, pred, oks: v });
            }
        }
    }
    // Sorting once is equivalent to re-selecting the max each round.
    candidates.sort_by(|a, b| {
        b.oks
            .total_cmp(&a.oks)
            .then(a.gt.cmp(&b.gt))
            .then(a.pred.cmp(&b.pred))
    });

    let mut gt_taken = vec![false; m];
    let mut pred_taken = vec![false; n];
    let mut matches = Vec::with_capacity(m.min(n));
    for c in candidates {
        if gt_taken[c.gt] || pred_taken[c.pred] {
            continue;
        }
        gt_taken[c.gt] = true;
        pred_taken[c.pred] = true;
        tracing::trace!(gt = c.gt, pred = c.pred, oks = c.oks, "matched");
        matches.push(c);
        if matches.len() == m.min(n) {
            break;
        }
    }

    MatchResult {
        matches,
        unmatched_gt: (0..m).filter(|&i| !gt_taken[i]).collect(),
        unmatched_pred: (0..n).filter(|&j| !pred_taken[j]).collect(),
    }
}
