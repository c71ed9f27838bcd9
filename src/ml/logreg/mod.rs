//! Binary logistic regression over dense, preprocessed feature rows.

use serde::{Deserialize, Serialize};

mod train;
pub use train::{TrainOptions, train_logreg};

/// Current on-disk format of [`LogRegModel`].
pub const LOGREG_MODEL_VERSION: i64 = 1;

/// Fitted weights for `P(y = 1 | x) = sigmoid(w·x + b)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRegModel {
    pub model_version: i64,
    pub n_features: usize,
    /// One coefficient per input column.
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogRegModel {
    /// Validate dimensions and numeric sanity.
    pub fn validate(&self) -> Result<(), String> {
        if self.model_version != LOGREG_MODEL_VERSION {
            return Err(format!(
                "Unsupported logreg model_version {} (expected {})",
                self.model_version, LOGREG_MODEL_VERSION
            ));
        }
        if self.n_features == 0 {
            return Err("No input features defined".to_string());
        }
        if self.weights.len() != self.n_features {
            return Err(format!(
                "weights length {} does not match n_features {}",
                self.weights.len(),
                self.n_features
            ));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err("weights must be finite".to_string());
        }
        Ok(())
    }

    /// Raw margin `w·x + b`; rows of the wrong width score as the bias alone.
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        if row.len() != self.n_features {
            return self.bias;
        }
        self.bias
            + self
                .weights
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision_function(row))
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> LogRegModel {
        LogRegModel {
            model_version: LOGREG_MODEL_VERSION,
            n_features: 2,
            weights: vec![2.0, -1.0],
            bias: 0.5,
        }
    }

    #[test]
    fn probability_follows_margin() {
        let model = model();
        model.validate().unwrap();
        assert!((model.decision_function(&[1.0, 1.0]) - 1.5).abs() < 1e-12);
        assert!((model.predict_proba(&[0.0, 0.5]) - 0.5).abs() < 1e-12);
        assert!(model.predict_proba(&[5.0, 0.0]) > 0.99);
    }

    #[test]
    fn sigmoid_is_stable_for_large_inputs() {
        assert_eq!(sigmoid(1_000.0), 1.0);
        assert_eq!(sigmoid(-1_000.0), 0.0);
    }

    #[test]
    fn validate_catches_width_mismatch() {
        let mut model = model();
        model.weights.pop();
        assert!(model.validate().is_err());
    }
}
