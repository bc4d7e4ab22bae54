//! Short-range pairwise particle interactions over interchangeable spatial
//! containers, with a runtime auto-tuner choosing container, traversal,
//! data layout and newton3 mode.

pub mod cell;
pub mod cell_block;
pub mod config;
pub mod configuration;
pub mod containers;
pub mod engine;
pub mod error;
pub mod functor;
pub mod integrator;
pub mod lj;
pub mod octree;
pub mod options;
pub mod particle;
pub mod properties;
pub(crate) mod shared;
pub mod soa;
pub mod transport;
pub mod traversal;
pub mod tuning;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

pub use config::EngineConfig;
pub use configuration::Configuration;
pub use containers::{ContainerParams, ParticleContainer};
pub use engine::PairwiseEngine;
pub use error::EngineError;
pub use functor::PairwiseFunctor;
pub use lj::LennardJones;
pub use octree::{AdaptiveOctree, OctreeParams};
pub use options::{ContainerOption, DataLayoutOption, Newton3Option, TraversalOption};
pub use particle::{MultisiteMolecule, OwnershipState, Particle};
pub use properties::ParticleProperties;
pub use tuning::{AutoTuner, TuningRecord};

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber. `RUST_LOG` wins over `level`, which
/// defaults to `info`. A second call is a no-op.
pub fn init_logging(level: Option<String>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_deref().unwrap_or("info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(true)
        .try_init();
}
