//! Time-averaged mean velocity inside a region.
//!
//! The finalized average lives on the local root of the active communicator
//! only. Unlike [`Density`](super::Density), nothing is propagated to the
//! other ranks unless [`Velocity::propagated`] is requested.

use super::accumulator::Accumulator;
use super::{Aggregation, LOCAL_ROOT, Scope, propagate_from_local_root};
use crate::algs::collective::reduce;
use crate::algs::communicator::{CommTag, Communicator};
use crate::entity::Entity;
use crate::region::Region;
use crate::stats_error::StatsError;

/// Point-to-point tag for the optional velocity handoff.
pub const VELOCITY_TAG: CommTag = CommTag(0x5301);

#[derive(Clone, Debug, Default)]
pub struct Velocity {
    local_sum: [f64; 3],
    means: Accumulator<3>,
    average: Option<[f64; 3]>,
    propagate: bool,
}

impl Velocity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also hand the last finalized average to every rank after each run.
    pub fn propagated() -> Self {
        Self {
            propagate: true,
            ..Self::default()
        }
    }

    /// Last finalized average (local root, or every rank when propagated).
    pub fn average(&self) -> Option<[f64; 3]> {
        self.average
    }

    /// Per-call means collected in the current window.
    pub fn pending_samples(&self) -> u32 {
        self.means.samples()
    }
}

impl Aggregation for Velocity {
    type Output = [f64; 3];

    fn on_setup(&mut self, _region: &dyn Region) -> Result<(), StatsError> {
        self.local_sum = [0.0; 3];
        self.means.reset();
        self.average = None;
        Ok(())
    }

    fn accumulate_local(&mut self, entity: &Entity) {
        for (s, v) in self.local_sum.iter_mut().zip(entity.v) {
            *s += v;
        }
    }

    fn reduce_global<C: Communicator>(
        &mut self,
        active: &C,
        global_count: u64,
        measurements: u32,
    ) -> Result<(), StatsError> {
        assert!(
            measurements != 0,
            "velocity averaging needs a non-zero measurement count"
        );
        let partial = std::mem::take(&mut self.local_sum);
        if let Some(sum) = reduce(active, LOCAL_ROOT, &partial, |a, b| a + b)? {
            let mean = if global_count > 0 {
                let inv = 1.0 / global_count as f64;
                [sum[0] * inv, sum[1] * inv, sum[2] * inv]
            } else {
                [0.0; 3]
            };
            self.means.add(mean);
        }
        Ok(())
    }

    fn write_value(&mut self, measurements: u32) -> [f64; 3] {
        let avg = self.means.finalize(measurements);
        self.average = Some(avg);
        avg
    }

    fn global_after_run<C: Communicator>(
        &mut self,
        scope: &Scope<'_, C>,
    ) -> Result<(), StatsError> {
        if !self.propagate {
            return Ok(());
        }
        // slot 0 flags whether the root has finalized anything yet
        let mut buf = match self.average {
            Some([x, y, z]) => [1.0, x, y, z],
            None => [0.0; 4],
        };
        propagate_from_local_root(scope, VELOCITY_TAG, &mut buf, false)?;
        self.average = (buf[0] != 0.0).then(|| [buf[1], buf[2], buf[3]]);
        Ok(())
    }
}
