//! Statistics over the entities of a region, computed only by the ranks that
//! hold any of them.
//!
//! A [`ValueCalculator`] decides once, at [`setup`](ValueCalculator::setup),
//! whether the calling rank is *active* (owns at least one entity inside the
//! region) and splits the world communicator so that the per-step reductions
//! in [`run`](ValueCalculator::run) involve only active ranks. Idle ranks never
//! enter those reductions.
//!
//! Activity is decided once. A rank that later gains or loses entities in the
//! region is not re-detected until the next `setup`.
//!
//! The quantity itself is supplied by an [`Aggregation`]:
//! [`Density`](density::Density) or [`Velocity`](velocity::Velocity).
//!
//! ```
//! use region_stats::algs::communicator::{Communicator, LocalUniverse};
//! use region_stats::calc::DensityCalculator;
//! use region_stats::entity::{ALL_GROUP, Entity};
//!
//! let densities = LocalUniverse::run(2, |world| {
//!     // only rank 1 owns entities inside x > 1
//!     let local = vec![Entity::new(1, [0.5 + world.rank() as f64, 0.0, 0.0])];
//!     let region = |x: f64, _y: f64, _z: f64| x > 1.0;
//!     let mut calc = DensityCalculator::density(region, ALL_GROUP, 1, 1).unwrap();
//!     calc.setup_with_volume(&world, &local, 0, 2.0).unwrap();
//!     calc.run(&world, &local, 1).unwrap();
//!     calc.aggregation().density()
//! });
//! assert_eq!(densities, vec![0.5, 0.5]);
//! ```

pub mod accumulator;
pub mod density;
pub mod velocity;

use crate::algs::collective::{all_reduce, broadcast};
use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{cast_slice, cast_slice_mut};
use crate::debug_invariants::DebugInvariants;
use crate::entity::{ALL_GROUP, Entity, EntitySource, GroupBits};
use crate::region::Region;
use crate::stats_error::StatsError;
use accumulator::Accumulator;
use bytemuck::Pod;
use std::sync::Arc;

pub use density::Density;
pub use velocity::Velocity;

/// Coordinator of an active communicator.
pub const LOCAL_ROOT: usize = 0;
/// Coordinator of the whole process mesh.
pub const GLOBAL_ROOT: usize = 0;

pub type DensityCalculator<C> = ValueCalculator<C, Density>;
pub type VelocityCalculator<C> = ValueCalculator<C, Velocity>;

/// Participation of this rank, fixed at setup.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Activity {
    #[default]
    Unknown,
    Active,
    Inactive,
}

/// A value completed after the configured number of measurements.
#[derive(Clone, Debug, PartialEq)]
pub struct Finalized<T> {
    pub step: u64,
    /// Mean number of matching entities per measurement.
    pub average_count: f64,
    pub value: T,
}

/// What an aggregation hook may see of the communicators after a run.
pub struct Scope<'a, C> {
    pub world: &'a C,
    /// Active communicator; `None` on inactive ranks.
    pub active: Option<&'a C>,
    /// Whether any rank in the world is active.
    pub any_active: bool,
}

impl<C: Communicator> Scope<'_, C> {
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_local_root(&self) -> bool {
        self.active.is_some_and(|c| c.rank() == LOCAL_ROOT)
    }
}

/// Quantity-specific hooks driven by [`ValueCalculator`].
pub trait Aggregation {
    type Output: Clone + std::fmt::Debug;

    /// Called at every setup with the resolved region. Running state from a
    /// previous setup must be discarded here.
    fn on_setup(&mut self, _region: &dyn Region) -> Result<(), StatsError> {
        Ok(())
    }

    /// Fold one matching local entity into the per-call partial.
    fn accumulate_local(&mut self, entity: &Entity);

    /// Combine partials across the active communicator. Runs on every active
    /// rank with the summed entity count.
    fn reduce_global<C: Communicator>(
        &mut self,
        active: &C,
        global_count: u64,
        measurements: u32,
    ) -> Result<(), StatsError>;

    /// Time-average on the local root once the window is complete.
    fn write_value(&mut self, measurements: u32) -> Self::Output;

    /// Runs on every rank, active or not, at the end of every `run`.
    fn global_after_run<C: Communicator>(
        &mut self,
        scope: &Scope<'_, C>,
    ) -> Result<(), StatsError>;
}

/// Two-phase aggregator over the entities of `group` inside a region.
pub struct ValueCalculator<C: Communicator, A: Aggregation> {
    region: Arc<dyn Region>,
    group: GroupBits,
    candidate_group: GroupBits,
    nevery: u64,
    measurements: u32,
    activity: Activity,
    comm: Option<C>,
    active_ranks: usize,
    epoch: u64,
    atoms: Accumulator<1>,
    aggregation: A,
}

impl<C: Communicator, A: Aggregation> ValueCalculator<C, A> {
    /// `measurements == 0` disables finalization; the per-call value is
    /// still computed.
    pub fn new(
        region: Arc<dyn Region>,
        group: GroupBits,
        nevery: u64,
        measurements: u32,
        aggregation: A,
    ) -> Result<Self, StatsError> {
        if nevery == 0 {
            return Err(StatsError::NonPositiveInterval(nevery));
        }
        Ok(Self {
            region,
            group,
            candidate_group: ALL_GROUP,
            nevery,
            measurements,
            activity: Activity::Unknown,
            comm: None,
            active_ranks: 0,
            epoch: 0,
            atoms: Accumulator::new(),
            aggregation,
        })
    }

    /// Group used at setup to decide activity (defaults to [`ALL_GROUP`]).
    pub fn with_candidate_group(mut self, bits: GroupBits) -> Self {
        self.candidate_group = bits;
        self
    }

    /// Decide activity and build the active communicator. Collective over `world`.
    ///
    /// Candidacy is tested against the broad candidate group, not the
    /// calculator's own group, so a momentarily empty narrower group does not
    /// make a rank inactive for good.
    pub fn setup<S: EntitySource + ?Sized>(
        &mut self,
        world: &C,
        source: &S,
        step: u64,
    ) -> Result<(), StatsError> {
        self.epoch = step;
        self.atoms.reset();
        self.aggregation.on_setup(self.region.as_ref())?;

        let active = source
            .entities()
            .iter()
            .any(|e| e.belongs_to(self.candidate_group) && self.region.contains_point(e.x));
        self.comm = world.split(active)?;
        self.activity = if active {
            Activity::Active
        } else {
            Activity::Inactive
        };
        self.active_ranks = all_reduce(world, &[u64::from(active)], |a, b| a + b)?[0] as usize;
        self.validate_invariants()?;
        log::debug!(
            "rank {} is {:?}; {} active ranks",
            world.rank(),
            self.activity,
            self.active_ranks
        );
        Ok(())
    }

    /// Sample once. Collective over `world` (inactive ranks only take part in
    /// [`Aggregation::global_after_run`]).
    ///
    /// Returns the finalized value on the local root when this call is the
    /// `measurements`-th since setup (or since the previous window closed).
    pub fn run<S: EntitySource + ?Sized>(
        &mut self,
        world: &C,
        source: &S,
        step: u64,
    ) -> Result<Option<Finalized<A::Output>>, StatsError> {
        if self.activity == Activity::Unknown {
            return Err(StatsError::NotSetUp);
        }
        let mut finalized = None;
        if let Some(comm) = &self.comm {
            let mut local_count = 0u64;
            for e in source.entities() {
                if e.belongs_to(self.group) && self.region.contains_point(e.x) {
                    self.aggregation.accumulate_local(e);
                    local_count += 1;
                }
            }
            let global_count = all_reduce(comm, &[local_count], |a, b| a + b)?[0];
            self.aggregation
                .reduce_global(comm, global_count, self.measurements)?;

            if comm.rank() == LOCAL_ROOT {
                self.atoms.add([global_count as f64]);
                if self.measurements > 0 && self.atoms.samples() == self.measurements {
                    let [average_count] = self.atoms.finalize(self.measurements);
                    let value = self.aggregation.write_value(self.measurements);
                    log::debug!("finalized at step {step}: {value:?}");
                    finalized = Some(Finalized {
                        step,
                        average_count,
                        value,
                    });
                }
            }
        }
        let scope = Scope {
            world,
            active: self.comm.as_ref(),
            any_active: self.active_ranks > 0,
        };
        self.aggregation.global_after_run(&scope)?;
        Ok(finalized)
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn is_active(&self) -> bool {
        self.activity == Activity::Active
    }

    /// Whether this rank is the local root of the active communicator.
    pub fn is_root(&self) -> bool {
        self.comm.as_ref().is_some_and(|c| c.rank() == LOCAL_ROOT)
    }

    pub fn communicator(&self) -> Option<&C> {
        self.comm.as_ref()
    }

    /// Number of active ranks in the world, known on every rank after setup.
    pub fn active_ranks(&self) -> usize {
        self.active_ranks
    }

    /// Step passed to the last [`setup`](Self::setup).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn nevery(&self) -> u64 {
        self.nevery
    }

    pub fn measurements(&self) -> u32 {
        self.measurements
    }

    pub fn aggregation(&self) -> &A {
        &self.aggregation
    }
}

impl<C: Communicator> ValueCalculator<C, Density> {
    pub fn density<R: Region + 'static>(
        region: R,
        group: GroupBits,
        nevery: u64,
        measurements: u32,
    ) -> Result<Self, StatsError> {
        Self::new(Arc::new(region), group, nevery, measurements, Density::new())
    }

    /// [`setup`](Self::setup) with an explicit interior volume instead of the
    /// region's own.
    pub fn setup_with_volume<S: EntitySource + ?Sized>(
        &mut self,
        world: &C,
        source: &S,
        step: u64,
        volume: f64,
    ) -> Result<(), StatsError> {
        self.aggregation.set_volume(volume);
        self.setup(world, source, step)
    }
}

impl<C: Communicator> ValueCalculator<C, Velocity> {
    pub fn velocity<R: Region + 'static>(
        region: R,
        group: GroupBits,
        nevery: u64,
        measurements: u32,
    ) -> Result<Self, StatsError> {
        Self::new(Arc::new(region), group, nevery, measurements, Velocity::new())
    }
}

impl<C: Communicator, A: Aggregation> DebugInvariants for ValueCalculator<C, A> {
    fn validate_invariants(&self) -> Result<(), StatsError> {
        let has_comm = self.comm.is_some();
        match (self.activity, has_comm) {
            (Activity::Active, true) | (Activity::Inactive, false) | (Activity::Unknown, false) => {
                Ok(())
            }
            (activity, _) => Err(StatsError::ActivityMismatch {
                rank: self.comm.as_ref().map_or(usize::MAX, |c| c.rank()),
                active: activity == Activity::Active,
                has_comm,
            }),
        }
    }
}

/// Two-tier propagation of `value` from the active communicator's local root
/// to every rank of `scope.world`.
///
/// The local root sends to the global coordinator (unless it *is* the global
/// coordinator), which receives from whichever rank sent and then broadcasts
/// to the whole world. At most one rank ever sends on `tag`, which is what
/// makes the wildcard receive safe.
///
/// With `replicated`, every active rank must already hold the value and any
/// disagreement with the broadcast is a [`StatsError::BroadcastMismatch`].
/// When no rank is active the exchange is skipped on every rank.
pub fn propagate_from_local_root<C, T>(
    scope: &Scope<'_, C>,
    tag: CommTag,
    value: &mut [T],
    replicated: bool,
) -> Result<(), StatsError>
where
    C: Communicator,
    T: Pod + PartialEq + std::fmt::Debug,
{
    if !scope.any_active {
        return Ok(());
    }
    let world = scope.world;
    let me = world.rank();
    let mut received = vec![T::zeroed(); value.len()];

    if scope.is_local_root() && me == GLOBAL_ROOT {
        received.copy_from_slice(value);
    } else {
        if scope.is_local_root() {
            world.isend(GLOBAL_ROOT, tag.as_u16(), cast_slice(value)).wait();
        }
        if me == GLOBAL_ROOT {
            let src = world.probe_any(tag.as_u16())?;
            let data = world
                .irecv(src, tag.as_u16(), cast_slice_mut(&mut received))
                .wait()
                .ok_or(StatsError::CommAborted)?;
            let width = std::mem::size_of_val(received.as_slice());
            if data.len() != width {
                return Err(StatsError::CommError {
                    neighbor: src,
                    source: format!("expected {width} bytes, got {}", data.len()).into(),
                });
            }
            cast_slice_mut(&mut received).copy_from_slice(&data);
        }
    }

    broadcast(world, GLOBAL_ROOT, &mut received)?;
    let must_match = if replicated {
        scope.is_active()
    } else {
        scope.is_local_root()
    };
    if must_match && received.as_slice() != &*value {
        return Err(StatsError::BroadcastMismatch {
            rank: me,
            local: format!("{value:?}"),
            broadcast: format!("{received:?}"),
        });
    }
    value.copy_from_slice(&received);
    Ok(())
}
