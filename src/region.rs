//! Region predicate seam and name lookup.
//!
//! Region geometry lives with the caller; this crate only needs a point test
//! and, for density, the interior volume.

use crate::stats_error::StatsError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A spatial membership predicate.
pub trait Region: Send + Sync {
    fn matches(&self, x: f64, y: f64, z: f64) -> bool;

    /// Interior volume, if the region knows it.
    fn volume_interior(&self) -> Option<f64> {
        None
    }

    #[inline]
    fn contains_point(&self, p: [f64; 3]) -> bool {
        self.matches(p[0], p[1], p[2])
    }
}

impl<F> Region for F
where
    F: Fn(f64, f64, f64) -> bool + Send + Sync,
{
    fn matches(&self, x: f64, y: f64, z: f64) -> bool {
        self(x, y, z)
    }
}

/// Named regions, resolved when a fix is configured.
#[derive(Clone, Default)]
pub struct RegionRegistry {
    regions: BTreeMap<String, Arc<dyn Region>>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<R: Region + 'static>(&mut self, name: impl Into<String>, region: R) {
        self.regions.insert(name.into(), Arc::new(region));
    }

    pub fn find(&self, name: &str) -> Result<Arc<dyn Region>, StatsError> {
        self.regions
            .get(name)
            .cloned()
            .ok_or_else(|| StatsError::UnknownRegion(name.to_owned()))
    }
}

impl std::fmt::Debug for RegionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.regions.keys()).finish()
    }
}
