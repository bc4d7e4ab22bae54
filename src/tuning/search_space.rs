use crate::configuration::{Configuration, DEFAULT_CLUSTER_SIZE};
use crate::error::TuningError;
use crate::options::{
    ContainerOption, DataLayoutOption, Newton3Option, TraversalOption, container_for_traversal,
};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of allowed cell size factors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberSet {
    Finite(Vec<f64>),
    Interval { min: f64, max: f64 },
}

impl NumberSet {
    /// Sorted, without duplicates or non-finite values.
    pub fn finite(values: impl IntoIterator<Item = f64>) -> Self {
        let mut v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
        v.sort_by(f64::total_cmp);
        v.dedup();
        NumberSet::Finite(v)
    }

    pub fn interval(min: f64, max: f64) -> Result<Self, TuningError> {
        if !(min.is_finite() && max.is_finite() && min <= max) {
            return Err(TuningError::InvalidParameter(format!(
                "interval [{min}, {max}] is not a finite, ordered range"
            )));
        }
        Ok(NumberSet::Interval { min, max })
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, NumberSet::Finite(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NumberSet::Finite(v) if v.is_empty())
    }

    pub fn values(&self) -> Option<&[f64]> {
        match self {
            NumberSet::Finite(v) => Some(v),
            NumberSet::Interval { .. } => None,
        }
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            NumberSet::Finite(v) => v.first().copied(),
            NumberSet::Interval { min, .. } => Some(*min),
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            NumberSet::Finite(v) => v.last().copied(),
            NumberSet::Interval { max, .. } => Some(*max),
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        match self {
            NumberSet::Finite(v) => v.contains(&x),
            NumberSet::Interval { min, max } => *min <= x && x <= *max,
        }
    }

    /// `n` values covering the set evenly: every finite value appears
    /// `n / len` or one more times, an interval gets one value per stratum.
    pub fn uniform_sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        match self {
            NumberSet::Finite(v) => sample_pool(v, n, rng),
            NumberSet::Interval { min, max } => {
                let width = max - min;
                let mut out: Vec<f64> = (0..n)
                    .map(|i| min + (i as f64 + rng.r#gen::<f64>()) / n as f64 * width)
                    .collect();
                out.shuffle(rng);
                out
            }
        }
    }
}

/// Draws `n` elements so that each element of `pool` is used as evenly as possible.
pub fn sample_pool<T: Clone, R: Rng + ?Sized>(pool: &[T], n: usize, rng: &mut R) -> Vec<T> {
    let mut out = Vec::with_capacity(n);
    if pool.is_empty() {
        return out;
    }
    while out.len() < n {
        let mut round = pool.to_vec();
        round.shuffle(rng);
        let take = (n - out.len()).min(round.len());
        out.extend(round.into_iter().take(take));
    }
    out
}

/// Axes the tuner may vary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub containers: BTreeSet<ContainerOption>,
    pub cell_size_factors: NumberSet,
    pub traversals: BTreeSet<TraversalOption>,
    pub data_layouts: BTreeSet<DataLayoutOption>,
    pub newton3: BTreeSet<Newton3Option>,
    pub cluster_sizes: BTreeSet<u32>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            containers: ContainerOption::ALL.into_iter().collect(),
            cell_size_factors: NumberSet::finite([1.0]),
            traversals: TraversalOption::ALL.into_iter().collect(),
            data_layouts: DataLayoutOption::ALL.into_iter().collect(),
            newton3: Newton3Option::ALL.into_iter().collect(),
            cluster_sizes: [DEFAULT_CLUSTER_SIZE].into_iter().collect(),
        }
    }
}

impl SearchSpace {
    /// Traversals whose container is part of the space.
    fn reachable_traversals(&self) -> Vec<(TraversalOption, ContainerOption)> {
        self.traversals
            .iter()
            .filter_map(|&t| {
                container_for_traversal(t)
                    .filter(|c| self.containers.contains(c))
                    .map(|c| (t, c))
            })
            .collect()
    }

    fn cluster_axis(&self, container: ContainerOption) -> Vec<Option<u32>> {
        if container.uses_cluster_size() {
            self.cluster_sizes.iter().map(|&n| Some(n)).collect()
        } else {
            vec![None]
        }
    }

    /// Every valid configuration, in a fixed order.
    pub fn configurations(&self) -> Result<Vec<Configuration>, TuningError> {
        let factors = self
            .cell_size_factors
            .values()
            .ok_or(TuningError::InfiniteSearchSpace)?;
        let mut out = Vec::new();
        for (traversal, container) in self.reachable_traversals() {
            let csfs: &[f64] = if container.uses_cell_size_factor() {
                factors
            } else {
                &[1.0]
            };
            for &csf in csfs {
                for cluster_size in self.cluster_axis(container) {
                    for &layout in &self.data_layouts {
                        for &n3 in &self.newton3 {
                            let mut c = Configuration::new(container, csf, traversal, layout, n3);
                            c.cluster_size = cluster_size;
                            if c.is_valid() {
                                out.push(c);
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Latin-hypercube style sample of valid configurations. Invalid draws
    /// are dropped, so fewer than `n` may come back.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Configuration> {
        let traversals = self.reachable_traversals();
        let layouts: Vec<_> = self.data_layouts.iter().copied().collect();
        let newton3: Vec<_> = self.newton3.iter().copied().collect();
        let clusters: Vec<_> = self.cluster_sizes.iter().copied().collect();

        let csf = self.cell_size_factors.uniform_sample(n, rng);
        let tr = sample_pool(&traversals, n, rng);
        let dl = sample_pool(&layouts, n, rng);
        let n3 = sample_pool(&newton3, n, rng);
        let cs = sample_pool(&clusters, n, rng);
        if tr.len() < n || dl.len() < n || n3.len() < n || csf.len() < n {
            return Vec::new();
        }

        (0..n)
            .filter_map(|i| {
                let (traversal, container) = tr[i];
                let factor = if container.uses_cell_size_factor() { csf[i] } else { 1.0 };
                let mut c = Configuration::new(container, factor, traversal, dl[i], n3[i]);
                if container.uses_cluster_size() {
                    c.cluster_size = Some(*cs.get(i)?);
                }
                c.is_valid().then_some(c)
            })
            .collect()
    }

    /// Removes a newton3 mode the functor cannot handle.
    pub fn remove_newton3(&mut self, option: Newton3Option) {
        self.newton3.remove(&option);
    }

    pub fn is_empty(&self) -> bool {
        match self.configurations() {
            Ok(c) => c.is_empty(),
            Err(_) => self.reachable_traversals().is_empty() || self.data_layouts.is_empty(),
        }
    }

    /// Contiguous share of the valid configurations for one rank. Ranks beyond
    /// the number of configurations get the one at `rank mod len`.
    pub fn distribute(&self, rank: usize, comm_size: usize) -> Result<Vec<Configuration>, TuningError> {
        if comm_size == 0 || rank >= comm_size {
            return Err(TuningError::InvalidParameter(format!(
                "rank {rank} is outside a communicator of size {comm_size}"
            )));
        }
        let all = self.configurations()?;
        if all.is_empty() {
            return Ok(all);
        }
        if comm_size >= all.len() {
            return Ok(vec![all[rank % all.len()].clone()]);
        }
        let base = all.len() / comm_size;
        let extra = all.len() % comm_size;
        let start = rank * base + rank.min(extra);
        let len = base + usize::from(rank < extra);
        Ok(all[start..start + len].to_vec())
    }
}
