//! Fix configuration.
//!
//! Configs deserialize with serde and are checked by `validate()` before any
//! collective work starts, so a bad parameter fails on every rank alike.

use crate::entity::{ALL_GROUP, GroupBits};
use crate::region::{Region, RegionRegistry};
use crate::stats_error::StatsError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

fn default_group() -> GroupBits {
    ALL_GROUP
}

/// Parameters of the count-atoms fix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountAtomsConfig {
    /// Name of the region to sample.
    pub region: String,
    /// Steps between samples.
    pub nevery: u64,
    /// Samples averaged into one output line.
    pub measurements: u32,
    #[serde(default = "default_group")]
    pub group: GroupBits,
    /// Output file; results go to the console when absent or unwritable.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Direction for the directional velocity column.
    #[serde(default)]
    pub direction: [f64; 3],
}

impl CountAtomsConfig {
    pub fn validate(&self) -> Result<(), StatsError> {
        if self.nevery == 0 {
            return Err(StatsError::NonPositiveInterval(self.nevery));
        }
        if self.measurements == 0 {
            return Err(StatsError::Config(
                "measurement count must be positive".into(),
            ));
        }
        if self.direction.iter().any(|d| !d.is_finite()) {
            return Err(StatsError::Config(format!(
                "direction {:?} is not finite",
                self.direction
            )));
        }
        Ok(())
    }

    pub fn resolve_region(&self, regions: &RegionRegistry) -> Result<Arc<dyn Region>, StatsError> {
        regions.find(&self.region)
    }
}

/// Parameters of the mesh dump fix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DumpMeshConfig {
    /// Steps between dumps.
    pub nevery: u64,
    /// Output prefix; files are named `<prefix>.<step / nevery>.obj`.
    pub file_template: String,
    #[serde(default = "default_group")]
    pub group: GroupBits,
    /// Triangles with a larger area are not written.
    #[serde(default)]
    pub max_triangle_area: Option<f64>,
}

impl DumpMeshConfig {
    pub fn validate(&self) -> Result<(), StatsError> {
        if self.nevery == 0 {
            return Err(StatsError::NonPositiveInterval(self.nevery));
        }
        if self.file_template.trim().is_empty() {
            return Err(StatsError::Config("file template is empty".into()));
        }
        if let Some(area) = self.max_triangle_area {
            if !(area.is_finite() && area > 0.0) {
                return Err(StatsError::Config(format!(
                    "max triangle area must be positive, got {area}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = DumpMeshConfig {
            nevery: 0,
            file_template: "mesh".into(),
            group: ALL_GROUP,
            max_triangle_area: None,
        };
        assert_eq!(cfg.validate(), Err(StatsError::NonPositiveInterval(0)));
    }
}
