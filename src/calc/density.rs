//! Number density inside a region.

use super::{Aggregation, Scope, propagate_from_local_root};
use crate::algs::communicator::{CommTag, Communicator};
use crate::entity::Entity;
use crate::region::Region;
use crate::stats_error::StatsError;

/// Point-to-point tag for the local-root → global-root density handoff.
pub const DENSITY_TAG: CommTag = CommTag(0x5300);

/// `count / volume`, replicated on every rank after each run.
#[derive(Clone, Debug, Default)]
pub struct Density {
    explicit_volume: Option<f64>,
    volume: f64,
    density: f64,
}

impl Density {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `volume` instead of the region's interior volume.
    pub fn set_volume(&mut self, volume: f64) {
        self.explicit_volume = Some(volume);
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Density of the last run; identical on every rank.
    pub fn density(&self) -> f64 {
        self.density
    }
}

impl Aggregation for Density {
    type Output = f64;

    fn on_setup(&mut self, region: &dyn Region) -> Result<(), StatsError> {
        let volume = self
            .explicit_volume
            .or_else(|| region.volume_interior())
            .ok_or_else(|| StatsError::Config("region has no interior volume".into()))?;
        if !(volume.is_finite() && volume > 0.0) {
            return Err(StatsError::Config(format!(
                "region volume must be positive, got {volume}"
            )));
        }
        self.volume = volume;
        self.density = 0.0;
        Ok(())
    }

    fn accumulate_local(&mut self, _entity: &Entity) {}

    fn reduce_global<C: Communicator>(
        &mut self,
        _active: &C,
        global_count: u64,
        _measurements: u32,
    ) -> Result<(), StatsError> {
        debug_assert!(self.volume > 0.0);
        self.density = global_count as f64 / self.volume;
        Ok(())
    }

    fn write_value(&mut self, _measurements: u32) -> f64 {
        self.density
    }

    fn global_after_run<C: Communicator>(
        &mut self,
        scope: &Scope<'_, C>,
    ) -> Result<(), StatsError> {
        propagate_from_local_root(
            scope,
            DENSITY_TAG,
            std::slice::from_mut(&mut self.density),
            true,
        )
    }
}
