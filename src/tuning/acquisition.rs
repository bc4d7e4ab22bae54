//! Acquisition functions for minimizing a measured time. Larger is better.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionFunction {
    /// Optimistic bound: low predicted time or high uncertainty.
    #[default]
    UpperConfidenceBound,
    Mean,
    Variance,
    ProbabilityOfImprovement,
    ExpectedImprovement,
}

/// Weight of the standard deviation in the confidence bound.
pub const UCB_BETA: f64 = 2.0;

impl AcquisitionFunction {
    /// Score of a candidate with predicted `mean` and `variance` against the
    /// best (smallest) output seen so far.
    pub fn evaluate(self, mean: f64, variance: f64, best: f64) -> f64 {
        let std = variance.max(0.0).sqrt();
        match self {
            AcquisitionFunction::UpperConfidenceBound => -mean + UCB_BETA * std,
            AcquisitionFunction::Mean => -mean,
            AcquisitionFunction::Variance => variance,
            AcquisitionFunction::ProbabilityOfImprovement => {
                if std == 0.0 {
                    f64::from(u8::from(mean < best))
                } else {
                    normal_cdf((best - mean) / std)
                }
            }
            AcquisitionFunction::ExpectedImprovement => expected_improvement(mean, std, best),
        }
    }
}

pub fn expected_improvement(mean: f64, std: f64, best: f64) -> f64 {
    let gain = best - mean;
    if std == 0.0 {
        return gain.max(0.0);
    }
    let z = gain / std;
    gain * normal_cdf(z) + std * normal_pdf(z)
}

pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

/// Abramowitz-Stegun 7.1.26, absolute error below 1.5e-7.
pub fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}
