use super::feature_vector::{FEATURE_DIMS, FeatureVector};
use crate::error::TuningError;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// Gaussian process regression over feature vectors with a squared
/// exponential kernel. Outputs are standardized internally.
#[derive(Clone, Debug)]
pub struct GaussianProcess {
    /// Prior variance.
    theta: f64,
    dimension_scales: [f64; FEATURE_DIMS],
    /// Observation noise added to the kernel diagonal.
    sigma: f64,
    inputs: Vec<FeatureVector>,
    outputs: Vec<f64>,
    output_mean: f64,
    output_scale: f64,
    chol: Option<Cholesky<f64, Dyn>>,
    weights: DVector<f64>,
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self::new(1.0, [1.0; FEATURE_DIMS], 1e-6)
    }
}

impl GaussianProcess {
    pub fn new(theta: f64, dimension_scales: [f64; FEATURE_DIMS], sigma: f64) -> Self {
        Self {
            theta,
            dimension_scales,
            sigma,
            inputs: Vec::new(),
            outputs: Vec::new(),
            output_mean: 0.0,
            output_scale: 1.0,
            chol: None,
            weights: DVector::zeros(0),
        }
    }

    pub fn num_evidence(&self) -> usize {
        self.inputs.len()
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
        self.chol = None;
        self.weights = DVector::zeros(0);
        self.output_mean = 0.0;
        self.output_scale = 1.0;
    }

    /// Smallest observed output, with its input.
    pub fn best(&self) -> Option<(FeatureVector, f64)> {
        self.inputs
            .iter()
            .zip(&self.outputs)
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(x, &y)| (*x, y))
    }

    fn kernel(&self, a: &FeatureVector, b: &FeatureVector) -> f64 {
        let d = a.difference(b);
        let r2: f64 = d
            .iter()
            .zip(&self.dimension_scales)
            .map(|(di, s)| s * di * di)
            .sum();
        self.theta * (-r2).exp()
    }

    pub fn add_evidence(&mut self, input: FeatureVector, output: f64) -> Result<(), TuningError> {
        if !output.is_finite() {
            return Err(TuningError::InvalidParameter(format!("non-finite evidence {output}")));
        }
        self.inputs.push(input);
        self.outputs.push(output);
        if let Err(e) = self.refit() {
            self.inputs.pop();
            self.outputs.pop();
            if self.inputs.is_empty() {
                self.clear();
            } else {
                self.refit()?;
            }
            return Err(e);
        }
        Ok(())
    }

    fn refit(&mut self) -> Result<(), TuningError> {
        let n = self.inputs.len();
        let mean = self.outputs.iter().sum::<f64>() / n as f64;
        let var = self.outputs.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n as f64;
        self.output_mean = mean;
        self.output_scale = if var > 0.0 { var.sqrt() } else { 1.0 };

        let k = DMatrix::from_fn(n, n, |i, j| {
            let noise = if i == j { self.sigma } else { 0.0 };
            self.kernel(&self.inputs[i], &self.inputs[j]) + noise
        });
        let chol = k.cholesky().ok_or(TuningError::SingularCovariance)?;
        let y = DVector::from_iterator(
            n,
            self.outputs.iter().map(|y| (y - self.output_mean) / self.output_scale),
        );
        self.weights = chol.solve(&y);
        self.chol = Some(chol);
        Ok(())
    }

    fn kernel_vector(&self, x: &FeatureVector) -> DVector<f64> {
        DVector::from_iterator(self.inputs.len(), self.inputs.iter().map(|xi| self.kernel(x, xi)))
    }

    /// Predicted mean and variance, in output units.
    pub fn predict(&self, x: &FeatureVector) -> (f64, f64) {
        let Some(chol) = &self.chol else {
            return (self.output_mean, self.theta * self.output_scale * self.output_scale);
        };
        let k = self.kernel_vector(x);
        let mean = self.output_mean + self.output_scale * k.dot(&self.weights);
        let v = chol.solve(&k);
        let var = (self.theta - k.dot(&v)).max(0.0);
        (mean, var * self.output_scale * self.output_scale)
    }

    pub fn predict_mean(&self, x: &FeatureVector) -> f64 {
        self.predict(x).0
    }

    pub fn predict_variance(&self, x: &FeatureVector) -> f64 {
        self.predict(x).1
    }
}
