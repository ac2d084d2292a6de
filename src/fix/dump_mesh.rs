//! Distributed mesh dump: one OBJ file per dump step, assembled on the world
//! coordinator from vertices scattered across ranks.
//!
//! Setup gathers, once, every tracked vertex id to all ranks (building the
//! [`GlobalVertexTable`]) and every triangle to the coordinator. Topology and
//! group membership are assumed static afterwards. Each dump then only moves
//! `(id, x, y, z)` records.

use crate::algs::collective::all_reduce;
use crate::algs::communicator::Communicator;
use crate::algs::gather::{all_gather_union, gather_union};
use crate::algs::wire::{WireTriangle, WireVertex};
use crate::config::DumpMeshConfig;
use crate::entity::EntitySource;
use crate::io::obj::{MeshSnapshot, dump_file_name, write_obj_file};
use crate::stats_error::StatsError;
use hashbrown::HashMap;
use itertools::Itertools;
use std::path::PathBuf;

/// Rank that assembles and writes the mesh.
pub const WRITER_RANK: usize = 0;

/// Raw vertex id → dense 0-based output index, ascending by raw id.
/// Identical on every rank.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlobalVertexTable {
    ids: Vec<u64>,
    index: HashMap<u64, usize>,
}

impl GlobalVertexTable {
    /// Sort and deduplicate `ids` into the canonical order.
    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        let ids: Vec<u64> = ids.into_iter().sorted_unstable().dedup().collect();
        let index = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Self { ids, index }
    }

    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Area of the triangle spanned by three points.
pub fn triangle_area(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    0.5 * (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt()
}

fn is_degenerate(a: [f64; 3], b: [f64; 3], c: [f64; 3], area: f64) -> bool {
    let d2 = |p: [f64; 3], q: [f64; 3]| (0..3).map(|k| (p[k] - q[k]).powi(2)).sum::<f64>();
    let longest = d2(a, b).max(d2(b, c)).max(d2(a, c));
    area <= f64::EPSILON * longest
}

/// Build the output mesh from gathered records.
///
/// Vertices come out sorted by id. Triangles are mapped through `table`;
/// degenerate ones and those with area above `max_area` are dropped. A
/// triangle naming an id missing from `table` is a consistency fault.
pub fn assemble_mesh(
    table: &GlobalVertexTable,
    records: &[WireVertex],
    triangles: &[[u64; 3]],
    max_area: Option<f64>,
) -> Result<MeshSnapshot, StatsError> {
    if records.len() != table.len() {
        return Err(StatsError::VertexCountMismatch {
            expected: table.len(),
            found: records.len(),
        });
    }
    let mut vertices = vec![[0.0; 3]; table.len()];
    for rec in records.iter().sorted_unstable_by_key(|r| r.id()) {
        let idx = table
            .index_of(rec.id())
            .ok_or(StatsError::UnknownVertex(rec.id()))?;
        vertices[idx] = rec.position();
    }

    let mut faces = Vec::with_capacity(triangles.len());
    for tri in triangles {
        let mut idx = [0usize; 3];
        for (slot, &id) in idx.iter_mut().zip(tri) {
            *slot = table.index_of(id).ok_or(StatsError::UnknownVertex(id))?;
        }
        let [a, b, c] = idx.map(|i| vertices[i]);
        let area = triangle_area(a, b, c);
        if is_degenerate(a, b, c, area) || max_area.is_some_and(|m| area > m) {
            continue;
        }
        faces.push(idx);
    }
    Ok(MeshSnapshot { vertices, faces })
}

/// The mesh dump fix.
pub struct DumpMesh {
    config: DumpMeshConfig,
    table: Option<GlobalVertexTable>,
    /// Gathered triangles; populated on [`WRITER_RANK`] only.
    triangles: Vec<[u64; 3]>,
    tracked: u64,
}

impl DumpMesh {
    pub fn new(config: DumpMeshConfig) -> Result<Self, StatsError> {
        config.validate()?;
        Ok(Self {
            config,
            table: None,
            triangles: Vec::new(),
            tracked: 0,
        })
    }

    /// Build the vertex table and collect the triangulation. Collective.
    pub fn setup<C, S>(&mut self, world: &C, source: &S) -> Result<(), StatsError>
    where
        C: Communicator,
        S: EntitySource + ?Sized,
    {
        let group = self.config.group;
        let mut local_ids = Vec::new();
        let mut local_tris = Vec::new();
        for (i, e) in source.entities().iter().enumerate() {
            if e.belongs_to(group) {
                local_ids.push(e.tag);
                local_tris.extend(source.angles(i).iter().map(|&t| WireTriangle::new(t)));
            }
        }
        self.tracked = all_reduce(world, &[local_ids.len() as u64], |a, b| a + b)?[0];

        let all_ids = all_gather_union(&local_ids, world)?;
        let table = GlobalVertexTable::from_ids(all_ids);
        if table.len() as u64 != self.tracked {
            log::warn!(
                "{} tracked entities map to {} distinct vertex ids",
                self.tracked,
                table.len()
            );
        }
        self.table = Some(table);

        self.triangles = gather_union(&local_tris, world, WRITER_RANK)?
            .iter()
            .map(WireTriangle::ids)
            .collect();
        log::debug!(
            "dump/mesh setup: {} vertices, {} triangles on rank {}",
            self.tracked,
            self.triangles.len(),
            world.rank()
        );
        Ok(())
    }

    /// Dump if `step` is a multiple of `nevery`. Collective.
    ///
    /// Returns the written path on [`WRITER_RANK`].
    pub fn end_of_step<C, S>(
        &mut self,
        world: &C,
        source: &S,
        step: u64,
    ) -> Result<Option<PathBuf>, StatsError>
    where
        C: Communicator,
        S: EntitySource + ?Sized,
    {
        if step % self.config.nevery != 0 {
            return Ok(None);
        }
        let Some(mesh) = self.snapshot(world, source)? else {
            return Ok(None);
        };
        let path = dump_file_name(&self.config.file_template, step, self.config.nevery);
        write_obj_file(&path, &mesh)?;
        Ok(Some(path))
    }

    /// Gather current positions and assemble the mesh on [`WRITER_RANK`].
    /// Collective; other ranks get `None`.
    pub fn snapshot<C, S>(&self, world: &C, source: &S) -> Result<Option<MeshSnapshot>, StatsError>
    where
        C: Communicator,
        S: EntitySource + ?Sized,
    {
        let table = self.table.as_ref().ok_or(StatsError::NotSetUp)?;
        let local: Vec<WireVertex> = source
            .entities()
            .iter()
            .filter(|e| e.belongs_to(self.config.group))
            .map(|e| WireVertex::new(e.tag, e.x))
            .collect();
        let records = gather_union(&local, world, WRITER_RANK)?;
        if world.rank() != WRITER_RANK {
            return Ok(None);
        }
        assemble_mesh(table, &records, &self.triangles, self.config.max_triangle_area).map(Some)
    }

    pub fn vertex_table(&self) -> Option<&GlobalVertexTable> {
        self.table.as_ref()
    }

    /// Tracked vertices across the world, counted at setup.
    pub fn tracked_vertices(&self) -> u64 {
        self.tracked
    }

    pub fn triangles(&self) -> &[[u64; 3]] {
        &self.triangles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_right_triangle_has_half_area() {
        let area = triangle_area([0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert!((area - 0.5).abs() < 1e-12);
    }

    #[test]
    fn table_is_sorted_and_deduplicated() {
        let t = GlobalVertexTable::from_ids([9, 3, 9, 5]);
        assert_eq!(t.ids(), &[3, 5, 9]);
        assert_eq!(t.index_of(9), Some(2));
        assert_eq!(t.index_of(4), None);
    }
}
