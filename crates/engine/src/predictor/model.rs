//! Hand-fit scaler, regression, and trigger models.
//!
//! Retraining builds a complete `ModelSnapshot` which is then published
//! atomically by the caller; inference only ever sees a fully-fit snapshot.

use thiserror::Error;

/// Ridge damping added to the normal-equation diagonal.
const RIDGE_LAMBDA: f64 = 1e-3;

/// Gradient-descent schedule for the trigger classifier.
const LOGISTIC_ITERATIONS: usize = 200;
const LOGISTIC_LEARNING_RATE: f64 = 0.1;

/// Programming errors at the model boundary.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("feature vector has {got} entries, model expects {expected}")]
    FeatureShapeMismatch { got: usize, expected: usize },
}

/// Per-feature standardization parameters, fit once per retraining cycle
/// and frozen until the next snapshot is published.
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl FeatureScaler {
    /// Fit column means and population standard deviations. A constant
    /// column gets scale 1.0 so transforming maps it to zero deviation.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len() as f64;
        let mut means = vec![0.0; dim];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut scales = vec![0.0; dim];
        for row in rows {
            for ((s, m), v) in scales.iter_mut().zip(&means).zip(row) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut scales {
            *s = (*s / n).sqrt();
            if *s < f64::EPSILON {
                *s = 1.0;
            }
        }
        Self { means, scales }
    }

    pub fn dim(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>, PredictorError> {
        if features.len() != self.dim() {
            return Err(PredictorError::FeatureShapeMismatch {
                got: features.len(),
                expected: self.dim(),
            });
        }
        Ok(features
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }
}

/// Linear model fit by ridge-damped normal equations.
#[derive(Debug, Clone)]
pub struct LinearModel {
    /// Feature weights plus a trailing bias term.
    weights: Vec<f64>,
}

impl LinearModel {
    /// Least-squares fit of `targets` against scaled feature rows.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64]) -> Self {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0) + 1;
        let mut xtx = vec![vec![0.0; dim]; dim];
        let mut xty = vec![0.0; dim];

        for (row, y) in rows.iter().zip(targets) {
            for i in 0..dim {
                let xi = if i + 1 == dim { 1.0 } else { row[i] };
                xty[i] += xi * y;
                for j in 0..dim {
                    let xj = if j + 1 == dim { 1.0 } else { row[j] };
                    xtx[i][j] += xi * xj;
                }
            }
        }
        for (i, diag_row) in xtx.iter_mut().enumerate() {
            diag_row[i] += RIDGE_LAMBDA;
        }

        Self {
            weights: solve_linear_system(xtx, xty),
        }
    }

    pub fn predict(&self, scaled: &[f64]) -> f64 {
        let bias = self.weights[self.weights.len() - 1];
        scaled
            .iter()
            .zip(&self.weights)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + bias
    }
}

/// Binary logistic model fit by fixed-step batch gradient descent.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    weights: Vec<f64>,
}

impl LogisticModel {
    pub fn fit(rows: &[Vec<f64>], labels: &[u8]) -> Self {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0) + 1;
        let mut weights = vec![0.0; dim];
        let n = rows.len() as f64;

        for _ in 0..LOGISTIC_ITERATIONS {
            let mut gradient = vec![0.0; dim];
            for (row, label) in rows.iter().zip(labels) {
                let p = sigmoid(dot_with_bias(&weights, row));
                let err = p - f64::from(*label);
                for (g, x) in gradient.iter_mut().zip(row) {
                    *g += err * x;
                }
                gradient[dim - 1] += err;
            }
            for (w, g) in weights.iter_mut().zip(&gradient) {
                *w -= LOGISTIC_LEARNING_RATE * g / n;
            }
        }
        Self { weights }
    }

    pub fn positive_probability(&self, scaled: &[f64]) -> f64 {
        sigmoid(dot_with_bias(&self.weights, scaled))
    }
}

fn dot_with_bias(weights: &[f64], row: &[f64]) -> f64 {
    let bias = weights[weights.len() - 1];
    weights.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + bias
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x.clamp(-30.0, 30.0)).exp())
}

/// Gaussian elimination with partial pivoting. The ridge term keeps the
/// system non-singular; a degenerate pivot zeroes that weight.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let pivot = a[col][col];
        if pivot.abs() < 1e-12 {
            continue;
        }
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in (col + 1)..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = if a[col][col].abs() < 1e-12 {
            0.0
        } else {
            sum / a[col][col]
        };
    }
    x
}

/// Fully-fit model state; immutable once published.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub scaler: FeatureScaler,
    pub regression: LinearModel,
    pub classifier: Option<LogisticModel>,
    /// Buffer size the snapshot was fit on.
    pub trained_samples: usize,
}

impl ModelSnapshot {
    /// Scale and run the regression.
    pub fn predict_value(&self, features: &[f64]) -> Result<f64, PredictorError> {
        let scaled = self.scaler.transform(features)?;
        Ok(self.regression.predict(&scaled))
    }

    /// Scale and run the trigger classifier, if one was fit.
    pub fn trigger_probability(&self, features: &[f64]) -> Result<Option<f64>, PredictorError> {
        let Some(classifier) = &self.classifier else {
            return Ok(None);
        };
        let scaled = self.scaler.transform(features)?;
        Ok(Some(classifier.positive_probability(&scaled)))
    }
}
