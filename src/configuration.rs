use crate::error::ConfigurationError;
use crate::functor::PairwiseFunctor;
use crate::options::{
    ContainerOption, DataLayoutOption, Newton3Option, TraversalOption, applicable_data_layouts,
    applicable_traversals,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

pub const DEFAULT_CLUSTER_SIZE: u32 = 4;

/// One point of the tuning search space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub container: ContainerOption,
    pub cell_size_factor: f64,
    pub traversal: TraversalOption,
    pub data_layout: DataLayoutOption,
    pub newton3: Newton3Option,
    /// Only meaningful for cluster lists.
    pub cluster_size: Option<u32>,
}

impl Eq for Configuration {}

impl Hash for Configuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.container.hash(state);
        self.cell_size_factor.to_bits().hash(state);
        self.traversal.hash(state);
        self.data_layout.hash(state);
        self.newton3.hash(state);
        self.cluster_size.hash(state);
    }
}

impl Configuration {
    pub fn new(
        container: ContainerOption,
        cell_size_factor: f64,
        traversal: TraversalOption,
        data_layout: DataLayoutOption,
        newton3: Newton3Option,
    ) -> Self {
        Self {
            container,
            cell_size_factor,
            traversal,
            data_layout,
            newton3,
            cluster_size: container
                .uses_cluster_size()
                .then_some(DEFAULT_CLUSTER_SIZE),
        }
    }

    pub fn with_cluster_size(mut self, cluster_size: u32) -> Self {
        self.cluster_size = Some(cluster_size);
        self
    }

    /// Safe for every functor that allows non-newton3 evaluation.
    pub fn fallback() -> Self {
        Self::new(
            ContainerOption::DirectSum,
            1.0,
            TraversalOption::DirectSum,
            DataLayoutOption::Aos,
            Newton3Option::Disabled,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let container = self.container;
        if !applicable_traversals(container).contains(&self.traversal) {
            return Err(ConfigurationError::InapplicableTraversal {
                container,
                traversal: self.traversal,
            });
        }
        if !applicable_data_layouts(container).contains(&self.data_layout) {
            return Err(ConfigurationError::InapplicableDataLayout {
                container,
                layout: self.data_layout,
            });
        }
        if !self.traversal.supports_newton3(self.newton3) {
            return Err(ConfigurationError::Newton3Unsupported {
                traversal: self.traversal,
                newton3: self.newton3,
            });
        }
        let csf = self.cell_size_factor;
        // Cell grids need cells at least one interaction length wide.
        if !csf.is_finite() || csf <= 0.0 || (container.uses_cell_size_factor() && csf < 1.0) {
            return Err(ConfigurationError::InvalidCellSizeFactor {
                container,
                factor: csf,
            });
        }
        let cluster_ok = match self.cluster_size {
            Some(n) => container.uses_cluster_size() && n >= 1,
            None => !container.uses_cluster_size(),
        };
        if !cluster_ok {
            return Err(ConfigurationError::InvalidClusterSize {
                container,
                cluster_size: self.cluster_size,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn check_functor<F: PairwiseFunctor + ?Sized>(&self, functor: &F) -> Result<(), ConfigurationError> {
        let allowed = match self.newton3 {
            Newton3Option::Enabled => functor.allows_newton3(),
            Newton3Option::Disabled => functor.allows_non_newton3(),
        };
        if allowed {
            Ok(())
        } else {
            Err(ConfigurationError::FunctorNewton3(self.newton3))
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{container: {}, cellSizeFactor: {}, traversal: {}, dataLayout: {}, newton3: {}",
            self.container, self.cell_size_factor, self.traversal, self.data_layout, self.newton3
        )?;
        if let Some(n) = self.cluster_size {
            write!(f, ", clusterSize: {n}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lc(traversal: TraversalOption, newton3: Newton3Option) -> Configuration {
        Configuration::new(
            ContainerOption::LinkedCells,
            1.0,
            traversal,
            DataLayoutOption::Aos,
            newton3,
        )
    }

    #[test]
    fn test_valid_combinations() {
        assert!(lc(TraversalOption::C08, Newton3Option::Enabled).is_valid());
        assert!(lc(TraversalOption::C01, Newton3Option::Disabled).is_valid());
        assert!(Configuration::fallback().is_valid());
        let vcl = Configuration::new(
            ContainerOption::VerletClusterLists,
            1.0,
            TraversalOption::VerletClusters,
            DataLayoutOption::Soa,
            Newton3Option::Enabled,
        );
        assert_eq!(vcl.cluster_size, Some(DEFAULT_CLUSTER_SIZE));
        assert!(vcl.is_valid());
    }

    #[test]
    fn test_invalid_combinations() {
        assert!(matches!(
            lc(TraversalOption::C01, Newton3Option::Enabled).validate(),
            Err(ConfigurationError::Newton3Unsupported { .. })
        ));
        assert!(matches!(
            lc(TraversalOption::VerletClusters, Newton3Option::Enabled).validate(),
            Err(ConfigurationError::InapplicableTraversal { .. })
        ));
        let mut small = lc(TraversalOption::C08, Newton3Option::Enabled);
        small.cell_size_factor = 0.5;
        assert!(matches!(
            small.validate(),
            Err(ConfigurationError::InvalidCellSizeFactor { .. })
        ));
        let vl_soa = Configuration::new(
            ContainerOption::VerletLists,
            1.0,
            TraversalOption::VerletLists,
            DataLayoutOption::Soa,
            Newton3Option::Enabled,
        );
        assert!(matches!(
            vl_soa.validate(),
            Err(ConfigurationError::InapplicableDataLayout { .. })
        ));
        let clustered_lc = lc(TraversalOption::C08, Newton3Option::Enabled).with_cluster_size(4);
        assert!(matches!(
            clustered_lc.validate(),
            Err(ConfigurationError::InvalidClusterSize { .. })
        ));
    }

    #[test]
    fn test_display() {
        let c = lc(TraversalOption::C18, Newton3Option::Disabled);
        assert_eq!(
            c.to_string(),
            "{container: LinkedCells, cellSizeFactor: 1, traversal: C18, dataLayout: AoS, newton3: disabled}"
        );
    }
}
