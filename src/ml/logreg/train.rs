use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::{LOGREG_MODEL_VERSION, LogRegModel, sigmoid};

/// Mini-batch gradient descent settings for the logistic regression head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.1,
            l2: 1e-4,
            batch_size: 32,
            seed: 42,
        }
    }
}

/// Fit a binary logistic regression on dense rows and 0/1 labels.
///
/// Deterministic for a given `options.seed`.
pub fn train_logreg(
    x: &[Vec<f64>],
    y: &[u8],
    options: &TrainOptions,
) -> Result<LogRegModel, String> {
    if x.is_empty() || y.is_empty() {
        return Err("Empty training set".to_string());
    }
    if x.len() != y.len() {
        return Err("Mismatched training inputs/labels".to_string());
    }
    let dim = x[0].len();
    if dim == 0 {
        return Err("Training rows have no features".to_string());
    }
    if x.iter().any(|row| row.len() != dim) {
        return Err("Inconsistent feature row length".to_string());
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut weights: Vec<f64> = (0..dim).map(|_| (rng.random::<f64>() - 0.5) * 0.01).collect();
    let mut bias = 0.0f64;

    let mut indices: Vec<usize> = (0..x.len()).collect();
    let batch_size = options.batch_size.max(1);
    let lr = options.learning_rate;
    let l2 = options.l2.max(0.0);

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            let mut grad_w = vec![0.0f64; dim];
            let mut grad_b = 0.0f64;
            for &idx in chunk {
                let row = &x[idx];
                let margin = bias + weights.iter().zip(row).map(|(w, v)| w * v).sum::<f64>();
                let diff = sigmoid(margin) - f64::from(y[idx].min(1));
                for (g, v) in grad_w.iter_mut().zip(row) {
                    *g += diff * v;
                }
                grad_b += diff;
            }
            let inv = 1.0 / chunk.len() as f64;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= lr * (g * inv + l2 * *w);
            }
            bias -= lr * grad_b * inv;
        }
    }

    let model = LogRegModel {
        model_version: LOGREG_MODEL_VERSION,
        n_features: dim,
        weights,
        bias,
    };
    model.validate()?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let v = i as f64 / 10.0 - 2.0;
            x.push(vec![v, 0.3]);
            y.push(u8::from(v > 0.0));
        }
        (x, y)
    }

    #[test]
    fn learns_separable_data() {
        let (x, y) = separable();
        let model = train_logreg(&x, &y, &TrainOptions::default()).unwrap();
        assert!(model.weights[0] > 0.0);
        assert!(model.predict_proba(&[1.5, 0.3]) > 0.9);
        assert!(model.predict_proba(&[-1.5, 0.3]) < 0.1);
    }

    #[test]
    fn same_seed_same_weights() {
        let (x, y) = separable();
        let options = TrainOptions {
            epochs: 5,
            ..TrainOptions::default()
        };
        let a = train_logreg(&x, &y, &options).unwrap();
        let b = train_logreg(&x, &y, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_inconsistent_rows() {
        let x = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(train_logreg(&x, &[0, 1], &TrainOptions::default()).is_err());
        assert!(train_logreg(&[], &[], &TrainOptions::default()).is_err());
    }
}
