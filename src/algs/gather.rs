//! Gather variable-length containers to one rank or to every rank.
//!
//! Vectors are concatenated in ascending rank order. Sets become the union of
//! all contributions. Maps become the key union; when two ranks contribute the
//! same key, the value from the lowest rank is kept. Callers are expected to
//! contribute disjoint keys (e.g. from disjoint ownership); this is a
//! precondition, not something the gather checks.
//!
//! The coordinator-only variants leave non-root outputs empty.
//!
//! ```
//! use region_stats::algs::communicator::{Communicator, LocalUniverse};
//! use region_stats::algs::gather::all_gather_union;
//!
//! let out = LocalUniverse::run(3, |comm| {
//!     let local = vec![comm.rank() as u32; comm.rank()];
//!     all_gather_union(&local, &comm).unwrap()
//! });
//! assert_eq!(out[0], vec![1, 2, 2]);
//! assert_eq!(out[0], out[2]);
//! ```

use crate::algs::collective::{all_gather_concat, gather_concat};
use crate::algs::communicator::Communicator;
use crate::stats_error::StatsError;
use bytemuck::Pod;
use std::collections::{BTreeMap, BTreeSet};

/// A container that can be flattened into fixed-width columns and rebuilt
/// from the concatenated columns of every rank.
pub trait GatherUnion: Sized {
    /// Gather to `root`; other ranks receive an empty container.
    fn gather_union<C: Communicator>(&self, comm: &C, root: usize) -> Result<Self, StatsError>;
    /// Gather to every rank.
    fn all_gather_union<C: Communicator>(&self, comm: &C) -> Result<Self, StatsError>;
}

impl<T: Pod> GatherUnion for Vec<T> {
    fn gather_union<C: Communicator>(&self, comm: &C, root: usize) -> Result<Self, StatsError> {
        gather_concat(comm, root, self)
    }

    fn all_gather_union<C: Communicator>(&self, comm: &C) -> Result<Self, StatsError> {
        all_gather_concat(comm, self)
    }
}

impl<T: Pod + Ord> GatherUnion for BTreeSet<T> {
    fn gather_union<C: Communicator>(&self, comm: &C, root: usize) -> Result<Self, StatsError> {
        let flat: Vec<T> = self.iter().copied().collect();
        Ok(gather_concat(comm, root, &flat)?.into_iter().collect())
    }

    fn all_gather_union<C: Communicator>(&self, comm: &C) -> Result<Self, StatsError> {
        let flat: Vec<T> = self.iter().copied().collect();
        Ok(all_gather_concat(comm, &flat)?.into_iter().collect())
    }
}

fn zip_first_wins<K: Ord, V>(keys: Vec<K>, values: Vec<V>) -> Result<BTreeMap<K, V>, StatsError> {
    if keys.len() != values.len() {
        return Err(StatsError::CommError {
            neighbor: 0,
            source: format!("{} keys gathered against {} values", keys.len(), values.len()).into(),
        });
    }
    let mut out = BTreeMap::new();
    for (k, v) in keys.into_iter().zip(values) {
        out.entry(k).or_insert(v);
    }
    Ok(out)
}

impl<K: Pod + Ord, V: Pod> GatherUnion for BTreeMap<K, V> {
    fn gather_union<C: Communicator>(&self, comm: &C, root: usize) -> Result<Self, StatsError> {
        let keys: Vec<K> = self.keys().copied().collect();
        let values: Vec<V> = self.values().copied().collect();
        let keys = gather_concat(comm, root, &keys)?;
        let values = gather_concat(comm, root, &values)?;
        zip_first_wins(keys, values)
    }

    fn all_gather_union<C: Communicator>(&self, comm: &C) -> Result<Self, StatsError> {
        let keys: Vec<K> = self.keys().copied().collect();
        let values: Vec<V> = self.values().copied().collect();
        let keys = all_gather_concat(comm, &keys)?;
        let values = all_gather_concat(comm, &values)?;
        zip_first_wins(keys, values)
    }
}

/// Union of every rank's `local` container on `root`.
pub fn gather_union<G: GatherUnion, C: Communicator>(
    local: &G,
    comm: &C,
    root: usize,
) -> Result<G, StatsError> {
    local.gather_union(comm, root)
}

/// Union of every rank's `local` container on every rank.
pub fn all_gather_union<G: GatherUnion, C: Communicator>(
    local: &G,
    comm: &C,
) -> Result<G, StatsError> {
    local.all_gather_union(comm)
}
