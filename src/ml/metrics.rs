//! Evaluation metrics for binary classifiers.

use serde::{Deserialize, Serialize};

/// Confusion counts for a binary classifier (positive class is `1`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_positives: u64,
}

impl ConfusionMatrix {
    /// Tally `(truth, predicted)` pairs.
    pub fn from_pairs(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&truth, &predicted) in y_true.iter().zip(y_pred) {
            cm.add(truth, predicted);
        }
        cm
    }

    pub fn add(&mut self, truth: u8, predicted: u8) {
        let slot = match (truth != 0, predicted != 0) {
            (false, false) => &mut self.true_negatives,
            (false, true) => &mut self.false_positives,
            (true, false) => &mut self.false_negatives,
            (true, true) => &mut self.true_positives,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }
}

/// Evaluation snapshot stored with a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when undefined (single-class truth or no scores).
    pub roc_auc: Option<f64>,
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Range checks applied to metrics read back from disk.
    pub fn validate(&self) -> Result<(), String> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(format!("{name} out of range: {value}"))
            }
        };
        unit("accuracy", self.accuracy)?;
        unit("precision", self.precision)?;
        unit("recall", self.recall)?;
        unit("f1", self.f1)?;
        if let Some(auc) = self.roc_auc {
            unit("roc_auc", auc)?;
        }
        Ok(())
    }
}

/// Compute metrics over same-length label sequences.
///
/// Precision, recall and F1 are zero when their denominator is zero. ROC-AUC
/// is only reported when `y_proba` matches `y_true` in length and both classes
/// appear in `y_true`.
pub fn compute(y_true: &[u8], y_pred: &[u8], y_proba: Option<&[f64]>) -> Metrics {
    let cm = ConfusionMatrix::from_pairs(y_true, y_pred);
    let tp = cm.true_positives as f64;
    let fp = cm.false_positives as f64;
    let fn_ = cm.false_negatives as f64;
    let total = cm.total() as f64;

    let accuracy = ratio(tp + cm.true_negatives as f64, total);
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = f1_score(precision, recall);
    let roc_auc = y_proba
        .filter(|scores| scores.len() == y_true.len())
        .and_then(|scores| roc_auc(y_true, scores));

    Metrics {
        accuracy,
        precision,
        recall,
        f1,
        roc_auc,
        confusion_matrix: cm,
    }
}

/// Area under the ROC curve via the rank-sum statistic (average ranks on ties).
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = y_true.iter().filter(|&&y| y != 0).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 || scores.iter().any(|s| !s.is_finite()) {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    let mut ranks = vec![0.0f64; scores.len()];
    let mut start = 0usize;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks; tied block shares the mean rank.
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }

    let positive_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y != 0)
        .map(|(_, rank)| rank)
        .sum();
    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}
