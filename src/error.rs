use crate::configuration::Configuration;
use crate::options::{ContainerOption, DataLayoutOption, Newton3Option, TraversalOption};
use thiserror::Error;

/// Rejected before any traversal runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("traversal {traversal} is not applicable to container {container}")]
    InapplicableTraversal {
        container: ContainerOption,
        traversal: TraversalOption,
    },
    #[error("data layout {layout} is not supported by container {container}")]
    InapplicableDataLayout {
        container: ContainerOption,
        layout: DataLayoutOption,
    },
    #[error("traversal {traversal} does not support newton3 {newton3}")]
    Newton3Unsupported {
        traversal: TraversalOption,
        newton3: Newton3Option,
    },
    #[error("functor does not allow newton3 {0}")]
    FunctorNewton3(Newton3Option),
    #[error("cell size factor {factor} is invalid for container {container}")]
    InvalidCellSizeFactor {
        container: ContainerOption,
        factor: f64,
    },
    #[error("cluster size {cluster_size:?} is invalid for container {container}")]
    InvalidClusterSize {
        container: ContainerOption,
        cluster_size: Option<u32>,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("box max {max:?} must exceed box min {min:?} in every dimension")]
    InvalidBox { min: [f64; 3], max: [f64; 3] },
    #[error("interaction length must be positive and finite, got {0}")]
    InvalidInteractionLength(f64),
    #[error("cell size factor must be positive and finite, got {0}")]
    InvalidCellSizeFactor(f64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContainerError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("particle {id} at {position:?} lies outside the container box")]
    OutsideBox { id: u64, position: [f64; 3] },
    #[error("cluster size must be at least 1")]
    InvalidClusterSize,
    #[error("rebuild frequency must be at least 1")]
    InvalidRebuildFrequency,
    #[error("container {container} was not built for configuration {configuration}")]
    ConfigurationMismatch {
        container: ContainerOption,
        configuration: Configuration,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FunctorError {
    #[error("end_traversal was already called for this traversal")]
    AlreadyPostProcessed,
    #[error("global values were requested before end_traversal")]
    NotPostProcessed,
    #[error("global values were requested but the functor does not calculate them")]
    GlobalsDisabled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuningError {
    #[error("encoded vector has length {got}, expected {expected}")]
    EncodingLength { expected: usize, got: usize },
    #[error("one-hot block for {axis} has {hot} hot entries, expected exactly one")]
    AmbiguousEncoding { axis: &'static str, hot: usize },
    #[error("no container accepts traversal {0}")]
    NoContainerFor(TraversalOption),
    #[error("the cell size factors form an interval and cannot be enumerated")]
    InfiniteSearchSpace,
    #[error("invalid tuning parameter: {0}")]
    InvalidParameter(String),
    #[error("Cholesky decomposition of the covariance matrix failed")]
    SingularCovariance,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("buffer length {len} is not a multiple of the record stride {stride}")]
    Misaligned { len: usize, stride: usize },
    #[error("invalid ownership state {0}")]
    InvalidOwnership(i64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OctreeError {
    #[error("octree box max {max:?} must exceed box min {min:?}")]
    InvalidBox { min: [f64; 3], max: [f64; 3] },
    #[error("max particles per node must be at least 1")]
    InvalidCapacity,
    #[error("coefficient (m={m}, n={n}) is out of range for order {order}")]
    CoefficientOutOfRange { m: i64, n: i64, order: usize },
    #[error("non-finite coefficient written at (m={m}, n={n})")]
    NonFinite { m: i64, n: i64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("time step must be positive and finite, got {0}")]
    InvalidTimeStep(f64),
    #[error("no mass registered for particle type {0}")]
    UnknownType(u64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Functor(#[from] FunctorError),
    #[error(transparent)]
    Tuning(#[from] TuningError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
