//! Wavefront OBJ writer for mesh dumps.

use crate::stats_error::StatsError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Assembled surface: vertex positions in global vertex order and triangles
/// as 0-based indices into `vertices`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshSnapshot {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[usize; 3]>,
}

/// `<template>.<step / nevery>.obj`
pub fn dump_file_name(template: &str, step: u64, nevery: u64) -> PathBuf {
    PathBuf::from(format!("{template}.{}.obj", step / nevery))
}

/// Write `mesh` as OBJ text; face indices are 1-based on output.
pub fn write_obj<W: Write>(mut out: W, mesh: &MeshSnapshot) -> Result<(), StatsError> {
    writeln!(out, "# Generated by dump/mesh")?;
    writeln!(out, "o Mesh")?;
    for [x, y, z] in &mesh.vertices {
        writeln!(out, "v {x:.6} {y:.6} {z:.6}")?;
    }
    for [a, b, c] in &mesh.faces {
        writeln!(out, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_obj_file(path: &Path, mesh: &MeshSnapshot) -> Result<(), StatsError> {
    let file = File::create(path)
        .map_err(|e| StatsError::Io(format!("could not open {}: {e}", path.display())))?;
    write_obj(BufWriter::new(file), mesh)
}
