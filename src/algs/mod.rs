//! Communication layer and the distributed algorithms built on it.

pub mod collective;
pub mod communicator;
pub mod gather;
pub mod molecule_counter;
pub mod wire;

pub use gather::{all_gather_union, gather_union};
pub use molecule_counter::MoleculeCounter;
