//! Dense renumbering of sparse molecule identifiers.
//!
//! Molecule ids held by a group are scattered unevenly across ranks and may
//! leave large gaps. [`MoleculeCounter::run`] compacts the ids present anywhere
//! in the group into `[0, N)`, ascending by raw id, identically on every rank.
//!
//! # Collective use
//! `run` is a collective over `comm`: every member must call it with the same
//! `group`.

use crate::algs::collective::all_reduce;
use crate::algs::communicator::Communicator;
use crate::debug_invariants::DebugInvariants;
use crate::entity::{Entity, EntitySource, GroupBits};
use crate::stats_error::StatsError;

/// Data-quality findings of the last [`MoleculeCounter::run`].
///
/// Identical on every rank; only the world coordinator logs them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MoleculeDiagnostics {
    /// Some group member carries molecule id `0`; it was left out.
    pub zero_id_in_group: bool,
    /// Some entity outside the group shares a molecule with the group.
    pub split_molecules: bool,
}

/// Dense index table over `[idlo, idhi]`.
#[derive(Clone, Debug, Default)]
pub struct MoleculeCounter {
    idlo: u64,
    idhi: u64,
    molnum: usize,
    molmap: Vec<Option<usize>>,
    diagnostics: MoleculeDiagnostics,
}

impl MoleculeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the table for the entities in `group` and return the number
    /// of distinct molecules.
    pub fn run<C, S>(&mut self, comm: &C, source: &S, group: GroupBits) -> Result<usize, StatsError>
    where
        C: Communicator,
        S: EntitySource + ?Sized,
    {
        *self = Self::default();
        let entities = source.entities();

        let mut lo = u64::MAX;
        let mut hi = 0u64;
        let mut zero_flag = 0u64;
        for e in entities.iter().filter(|e| e.belongs_to(group)) {
            if e.molecule == 0 {
                zero_flag = 1;
            } else {
                lo = lo.min(e.molecule);
                hi = hi.max(e.molecule);
            }
        }

        let zero_all = all_reduce(comm, &[zero_flag], |a, b| a + b)?[0];
        self.diagnostics.zero_id_in_group = zero_all > 0;
        if self.diagnostics.zero_id_in_group && comm.rank() == 0 {
            log::warn!("Entity with molecule ID = 0 included in molecule group");
        }

        let idlo = all_reduce(comm, &[lo], |a, b| a.min(b))?[0];
        let idhi = all_reduce(comm, &[hi], |a, b| a.max(b))?[0];
        if idlo == u64::MAX {
            return Ok(0);
        }

        let nlen = (idhi - idlo + 1) as usize;
        let mut present = vec![0u8; nlen];
        for e in entities.iter().filter(|e| e.belongs_to(group) && e.molecule != 0) {
            present[(e.molecule - idlo) as usize] = 1;
        }
        let present = all_reduce(comm, &present, |a, b| a.max(b))?;

        let mut next = 0usize;
        self.molmap = present
            .iter()
            .map(|&p| {
                (p != 0).then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        self.idlo = idlo;
        self.idhi = idhi;
        self.molnum = next;

        let split_flag = entities
            .iter()
            .filter(|e| !e.belongs_to(group))
            .any(|e| self.try_dense_index(e.molecule).is_some());
        let split_all = all_reduce(comm, &[u64::from(split_flag)], |a, b| a + b)?[0];
        self.diagnostics.split_molecules = split_all > 0;
        if self.diagnostics.split_molecules && comm.rank() == 0 {
            log::warn!("One or more molecules have entities not in group");
        }

        crate::debug_invariants!(self.validate_invariants(), "MoleculeCounter::run");
        log::debug!(
            "molecule ids [{idlo}, {idhi}] compacted to {} molecules",
            self.molnum
        );
        Ok(self.molnum)
    }

    /// Smallest non-zero molecule id in the group (0 when the group is empty).
    pub fn idlo(&self) -> u64 {
        self.idlo
    }

    /// Largest molecule id in the group (0 when the group is empty).
    pub fn idhi(&self) -> u64 {
        self.idhi
    }

    pub fn molecule_count(&self) -> usize {
        self.molnum
    }

    pub fn diagnostics(&self) -> MoleculeDiagnostics {
        self.diagnostics
    }

    /// Dense index of `raw`, or `None` if no group member carries it.
    ///
    /// # Panics
    /// If `raw` lies outside `[idlo, idhi]` (or the table is empty). Use
    /// [`try_dense_index`](Self::try_dense_index) for untrusted ids.
    pub fn dense_index(&self, raw: u64) -> Option<usize> {
        assert!(
            !self.molmap.is_empty() && raw >= self.idlo && raw <= self.idhi,
            "molecule id {raw} outside [{}, {}]",
            self.idlo,
            self.idhi
        );
        self.molmap[(raw - self.idlo) as usize]
    }

    /// Range-checked variant of [`dense_index`](Self::dense_index).
    pub fn try_dense_index(&self, raw: u64) -> Option<usize> {
        if self.molmap.is_empty() || raw < self.idlo || raw > self.idhi {
            return None;
        }
        self.molmap[(raw - self.idlo) as usize]
    }

    /// Dense molecule index of a local entity.
    pub fn molecule_of(&self, entity: &Entity) -> Option<usize> {
        self.try_dense_index(entity.molecule)
    }
}

impl DebugInvariants for MoleculeCounter {
    fn validate_invariants(&self) -> Result<(), StatsError> {
        if self.molmap.is_empty() {
            return if self.molnum == 0 {
                Ok(())
            } else {
                Err(StatsError::Config(format!(
                    "empty molecule table reports {} molecules",
                    self.molnum
                )))
            };
        }
        let span = (self.idhi - self.idlo + 1) as usize;
        if self.molmap.len() != span {
            return Err(StatsError::Config(format!(
                "molecule table length {} does not cover [{}, {}]",
                self.molmap.len(),
                self.idlo,
                self.idhi
            )));
        }
        let dense: Vec<usize> = self.molmap.iter().flatten().copied().collect();
        if dense.iter().enumerate().any(|(i, &d)| i != d) || dense.len() != self.molnum {
            return Err(StatsError::Config(
                "dense molecule indices are not contiguous from 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::entity::ALL_GROUP;

    fn mol(tag: u64, molecule: u64) -> Entity {
        Entity::new(tag, [0.0; 3]).with_molecule(molecule)
    }

    #[test]
    fn gaps_are_skipped_in_dense_order() {
        let local = vec![mol(1, 40), mol(2, 10), mol(3, 40), mol(4, 25)];
        let mut counter = MoleculeCounter::new();
        assert_eq!(counter.run(&NoComm, &local, ALL_GROUP).unwrap(), 3);
        assert_eq!(counter.dense_index(10), Some(0));
        assert_eq!(counter.dense_index(11), None);
        assert_eq!(counter.dense_index(25), Some(1));
        assert_eq!(counter.dense_index(40), Some(2));
        counter.validate_invariants().unwrap();
    }

    #[test]
    fn empty_group_yields_no_table() {
        let local = vec![mol(1, 0)];
        let mut counter = MoleculeCounter::new();
        assert_eq!(counter.run(&NoComm, &local, ALL_GROUP).unwrap(), 0);
        assert!(counter.diagnostics().zero_id_in_group);
        assert_eq!(counter.try_dense_index(1), None);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn dense_index_out_of_range_is_a_fault() {
        let local = vec![mol(1, 5)];
        let mut counter = MoleculeCounter::new();
        counter.run(&NoComm, &local, ALL_GROUP).unwrap();
        let _ = counter.dense_index(6);
    }
}
