//! Discrete configuration axes and the applicability map between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerOption {
    DirectSum,
    LinkedCells,
    VerletLists,
    VerletListsCells,
    VerletClusterLists,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalOption {
    DirectSum,
    C01,
    C08,
    C18,
    Sliced,
    VerletLists,
    VlcC01,
    VlcC18,
    VlcSliced,
    VerletClusters,
    VerletClustersSliced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLayoutOption {
    Aos,
    Soa,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Newton3Option {
    Disabled,
    Enabled,
}

impl ContainerOption {
    pub const ALL: [ContainerOption; 5] = [
        ContainerOption::DirectSum,
        ContainerOption::LinkedCells,
        ContainerOption::VerletLists,
        ContainerOption::VerletListsCells,
        ContainerOption::VerletClusterLists,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ContainerOption::DirectSum => "DirectSum",
            ContainerOption::LinkedCells => "LinkedCells",
            ContainerOption::VerletLists => "VerletLists",
            ContainerOption::VerletListsCells => "VerletListsCells",
            ContainerOption::VerletClusterLists => "VerletClusterLists",
        }
    }

    /// Containers whose geometry is a cell grid scaled by the cell size factor.
    pub const fn uses_cell_size_factor(self) -> bool {
        matches!(
            self,
            ContainerOption::LinkedCells
                | ContainerOption::VerletLists
                | ContainerOption::VerletListsCells
        )
    }

    pub const fn uses_cluster_size(self) -> bool {
        matches!(self, ContainerOption::VerletClusterLists)
    }
}

impl TraversalOption {
    pub const ALL: [TraversalOption; 11] = [
        TraversalOption::DirectSum,
        TraversalOption::C01,
        TraversalOption::C08,
        TraversalOption::C18,
        TraversalOption::Sliced,
        TraversalOption::VerletLists,
        TraversalOption::VlcC01,
        TraversalOption::VlcC18,
        TraversalOption::VlcSliced,
        TraversalOption::VerletClusters,
        TraversalOption::VerletClustersSliced,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TraversalOption::DirectSum => "DirectSum",
            TraversalOption::C01 => "C01",
            TraversalOption::C08 => "C08",
            TraversalOption::C18 => "C18",
            TraversalOption::Sliced => "Sliced",
            TraversalOption::VerletLists => "VerletLists",
            TraversalOption::VlcC01 => "VlcC01",
            TraversalOption::VlcC18 => "VlcC18",
            TraversalOption::VlcSliced => "VlcSliced",
            TraversalOption::VerletClusters => "VerletClusters",
            TraversalOption::VerletClustersSliced => "VerletClustersSliced",
        }
    }

    pub const fn supports_newton3(self, newton3: Newton3Option) -> bool {
        match self {
            TraversalOption::C01 | TraversalOption::VlcC01 => {
                matches!(newton3, Newton3Option::Disabled)
            }
            _ => true,
        }
    }
}

impl DataLayoutOption {
    pub const ALL: [DataLayoutOption; 2] = [DataLayoutOption::Aos, DataLayoutOption::Soa];

    pub const fn as_str(self) -> &'static str {
        match self {
            DataLayoutOption::Aos => "AoS",
            DataLayoutOption::Soa => "SoA",
        }
    }
}

impl Newton3Option {
    pub const ALL: [Newton3Option; 2] = [Newton3Option::Disabled, Newton3Option::Enabled];

    pub const fn as_str(self) -> &'static str {
        match self {
            Newton3Option::Disabled => "disabled",
            Newton3Option::Enabled => "enabled",
        }
    }

    pub const fn is_enabled(self) -> bool {
        matches!(self, Newton3Option::Enabled)
    }
}

impl From<bool> for Newton3Option {
    fn from(enabled: bool) -> Self {
        if enabled {
            Newton3Option::Enabled
        } else {
            Newton3Option::Disabled
        }
    }
}

/// Traversals a container can execute.
pub const fn applicable_traversals(container: ContainerOption) -> &'static [TraversalOption] {
    match container {
        ContainerOption::DirectSum => &[TraversalOption::DirectSum],
        ContainerOption::LinkedCells => &[
            TraversalOption::C01,
            TraversalOption::C08,
            TraversalOption::C18,
            TraversalOption::Sliced,
        ],
        ContainerOption::VerletLists => &[TraversalOption::VerletLists],
        ContainerOption::VerletListsCells => &[
            TraversalOption::VlcC01,
            TraversalOption::VlcC18,
            TraversalOption::VlcSliced,
        ],
        ContainerOption::VerletClusterLists => &[
            TraversalOption::VerletClusters,
            TraversalOption::VerletClustersSliced,
        ],
    }
}

pub const fn applicable_data_layouts(container: ContainerOption) -> &'static [DataLayoutOption] {
    match container {
        ContainerOption::VerletLists | ContainerOption::VerletListsCells => &[DataLayoutOption::Aos],
        _ => &[DataLayoutOption::Aos, DataLayoutOption::Soa],
    }
}

/// Every traversal belongs to exactly one container.
pub fn container_for_traversal(traversal: TraversalOption) -> Option<ContainerOption> {
    ContainerOption::ALL
        .into_iter()
        .find(|&c| applicable_traversals(c).contains(&traversal))
}

macro_rules! display_and_parse {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty>::ALL
                    .into_iter()
                    .find(|o| o.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| format!("unknown {}: {s}", stringify!($ty)))
            }
        }
    };
}

display_and_parse!(ContainerOption);
display_and_parse!(TraversalOption);
display_and_parse!(DataLayoutOption);
display_and_parse!(Newton3Option);
