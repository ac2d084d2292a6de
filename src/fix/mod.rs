//! Per-step fixes built on the aggregation layer.

pub mod count_atoms;
pub mod dump_mesh;
pub mod sink;

pub use count_atoms::CountAtoms;
pub use dump_mesh::DumpMesh;
