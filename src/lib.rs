//! # region-stats
//!
//! region-stats aggregates per-entity quantities of a particle simulation whose
//! entities are spread over many processes. It provides:
//!
//! - Gather primitives that collect vectors, sets and maps to one rank or to
//!   every rank ([`algs::gather`]).
//! - [`MoleculeCounter`](algs::MoleculeCounter), which compacts sparse global
//!   molecule ids into a dense `[0, N)` index.
//! - The [`ValueCalculator`](calc::ValueCalculator) framework: only processes
//!   owning entities inside a region take part in the per-step reductions,
//!   with density and velocity aggregations built in.
//! - Fixes driving those pieces every few steps: a count/velocity reporter
//!   ([`fix::CountAtoms`]) and a distributed mesh dump to Wavefront OBJ
//!   ([`fix::DumpMesh`]).
//!
//! ## Communication backends
//!
//! Everything is written against the [`Communicator`](algs::communicator::Communicator)
//! trait. [`NoComm`](algs::communicator::NoComm) is the single-process case,
//! [`LocalUniverse`](algs::communicator::LocalUniverse) runs ranks as threads
//! of one process, and `MpiComm` (feature `mpi-support`) wraps an MPI
//! communicator.
//!
//! ```toml
//! [dependencies]
//! region-stats = { version = "0.3", features = ["mpi-support"] }
//! ```

pub mod algs;
pub mod calc;
pub mod config;
pub mod debug_invariants;
pub mod entity;
pub mod fix;
pub mod io;
pub mod region;
pub mod stats_error;

pub use debug_invariants::DebugInvariants;
pub use stats_error::StatsError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, LocalComm, LocalUniverse, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::gather::{GatherUnion, all_gather_union, gather_union};
    pub use crate::algs::molecule_counter::MoleculeCounter;
    pub use crate::calc::{
        Activity, Aggregation, Density, DensityCalculator, Finalized, ValueCalculator, Velocity,
        VelocityCalculator,
    };
    pub use crate::config::{CountAtomsConfig, DumpMeshConfig};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::entity::{ALL_GROUP, Entity, EntitySource, EntityStore, GroupBits};
    pub use crate::fix::count_atoms::CountAtoms;
    pub use crate::fix::dump_mesh::DumpMesh;
    pub use crate::fix::sink::{CountRecord, ResultSink};
    pub use crate::region::{Region, RegionRegistry};
    pub use crate::stats_error::StatsError;
}
