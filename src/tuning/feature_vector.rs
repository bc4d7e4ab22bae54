//! Numeric view of a configuration for distance-based surrogate models.

use super::search_space::SearchSpace;
use crate::configuration::Configuration;
use crate::error::TuningError;
use crate::options::{DataLayoutOption, Newton3Option, TraversalOption, container_for_traversal};
use nalgebra::DVector;
use rand::Rng;

/// Continuous axis plus the discrete axes. The container is implied by the traversal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureVector {
    pub cell_size_factor: f64,
    pub traversal: TraversalOption,
    pub data_layout: DataLayoutOption,
    pub newton3: Newton3Option,
    pub cluster_size: Option<u32>,
}

pub const FEATURE_DIMS: usize = 5;

pub const ONE_HOT_DIMS: usize =
    1 + TraversalOption::ALL.len() + DataLayoutOption::ALL.len() + Newton3Option::ALL.len();

impl From<&Configuration> for FeatureVector {
    fn from(c: &Configuration) -> Self {
        Self {
            cell_size_factor: c.cell_size_factor,
            traversal: c.traversal,
            data_layout: c.data_layout,
            newton3: c.newton3,
            cluster_size: c.cluster_size,
        }
    }
}

fn differs<T: PartialEq>(a: T, b: T) -> f64 {
    if a == b { 0.0 } else { 1.0 }
}

impl FeatureVector {
    /// Component-wise difference; discrete axes contribute 0 or 1.
    pub fn difference(&self, other: &Self) -> [f64; FEATURE_DIMS] {
        [
            self.cell_size_factor - other.cell_size_factor,
            differs(self.traversal, other.traversal),
            differs(self.data_layout, other.data_layout),
            differs(self.newton3, other.newton3),
            differs(self.cluster_size, other.cluster_size),
        ]
    }

    pub fn distance_squared(&self, other: &Self) -> f64 {
        self.difference(other).iter().map(|d| d * d).sum()
    }

    pub fn to_configuration(&self) -> Result<Configuration, TuningError> {
        let container =
            container_for_traversal(self.traversal).ok_or(TuningError::NoContainerFor(self.traversal))?;
        let mut c = Configuration::new(
            container,
            self.cell_size_factor,
            self.traversal,
            self.data_layout,
            self.newton3,
        );
        if self.cluster_size.is_some() {
            c.cluster_size = self.cluster_size;
        }
        Ok(c)
    }

    /// `[csf, traversal one-hot, layout one-hot, newton3 one-hot]`.
    pub fn one_hot_encode(&self) -> DVector<f64> {
        let mut data = Vec::with_capacity(ONE_HOT_DIMS);
        data.push(self.cell_size_factor);
        data.extend(TraversalOption::ALL.iter().map(|&t| 1.0 - differs(t, self.traversal)));
        data.extend(DataLayoutOption::ALL.iter().map(|&d| 1.0 - differs(d, self.data_layout)));
        data.extend(Newton3Option::ALL.iter().map(|&n| 1.0 - differs(n, self.newton3)));
        DVector::from_vec(data)
    }

    /// Inverse of [`one_hot_encode`](Self::one_hot_encode). The cluster size is
    /// not encoded and comes back as the container default.
    pub fn one_hot_decode(v: &DVector<f64>) -> Result<Self, TuningError> {
        if v.len() != ONE_HOT_DIMS {
            return Err(TuningError::EncodingLength {
                expected: ONE_HOT_DIMS,
                got: v.len(),
            });
        }
        let values = v.as_slice();
        let mut pos = 1;
        let traversal = decode_block(values, &mut pos, &TraversalOption::ALL, "traversal")?;
        let data_layout = decode_block(values, &mut pos, &DataLayoutOption::ALL, "data layout")?;
        let newton3 = decode_block(values, &mut pos, &Newton3Option::ALL, "newton3")?;
        let container = container_for_traversal(traversal).ok_or(TuningError::NoContainerFor(traversal))?;
        let default = Configuration::new(container, values[0], traversal, data_layout, newton3);
        Ok(Self::from(&default))
    }

    /// Indices of the discrete axes within the allowed options, plus the
    /// continuous value. `None` if an axis value is not among the options.
    pub fn cluster_encode(
        &self,
        traversals: &[TraversalOption],
        layouts: &[DataLayoutOption],
        newton3: &[Newton3Option],
    ) -> Option<([usize; 3], f64)> {
        let t = traversals.iter().position(|&x| x == self.traversal)?;
        let d = layouts.iter().position(|&x| x == self.data_layout)?;
        let n = newton3.iter().position(|&x| x == self.newton3)?;
        Some(([t, d, n], self.cell_size_factor))
    }

    pub fn cluster_decode(
        discrete: [usize; 3],
        cell_size_factor: f64,
        traversals: &[TraversalOption],
        layouts: &[DataLayoutOption],
        newton3: &[Newton3Option],
    ) -> Result<Self, TuningError> {
        let out_of_range = |axis: &str, i: usize, len: usize| {
            TuningError::InvalidParameter(format!("{axis} index {i} out of range for {len} options"))
        };
        let traversal = *traversals
            .get(discrete[0])
            .ok_or_else(|| out_of_range("traversal", discrete[0], traversals.len()))?;
        let data_layout = *layouts
            .get(discrete[1])
            .ok_or_else(|| out_of_range("data layout", discrete[1], layouts.len()))?;
        let n3 = *newton3
            .get(discrete[2])
            .ok_or_else(|| out_of_range("newton3", discrete[2], newton3.len()))?;
        let container = container_for_traversal(traversal).ok_or(TuningError::NoContainerFor(traversal))?;
        Ok(Self::from(&Configuration::new(
            container,
            cell_size_factor,
            traversal,
            data_layout,
            n3,
        )))
    }

    /// Latin-hypercube sample of valid feature vectors from `space`.
    pub fn lhs_sample<R: Rng + ?Sized>(n: usize, rng: &mut R, space: &SearchSpace) -> Vec<Self> {
        space.sample(n, rng).iter().map(Self::from).collect()
    }
}

fn decode_block<T: Copy>(
    values: &[f64],
    pos: &mut usize,
    options: &[T],
    axis: &'static str,
) -> Result<T, TuningError> {
    let block = &values[*pos..*pos + options.len()];
    *pos += options.len();
    let hot: Vec<usize> = block
        .iter()
        .enumerate()
        .filter(|&(_, &x)| x == 1.0)
        .map(|(i, _)| i)
        .collect();
    match hot.as_slice() {
        [i] => Ok(options[*i]),
        _ => Err(TuningError::AmbiguousEncoding { axis, hot: hot.len() }),
    }
}
