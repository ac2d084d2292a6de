mod util;
use region_stats::algs::communicator::{Communicator, LocalUniverse, NoComm};
use region_stats::algs::wire::WireVertex;
use region_stats::config::DumpMeshConfig;
use region_stats::entity::{ALL_GROUP, EntityStore};
use region_stats::fix::dump_mesh::{DumpMesh, GlobalVertexTable, assemble_mesh};
use region_stats::stats_error::StatsError;
use util::*;

fn square() -> (GlobalVertexTable, Vec<WireVertex>) {
    let table = GlobalVertexTable::from_ids([40, 10, 30, 20]);
    let records = vec![
        WireVertex::new(30, [1.0, 1.0, 0.0]),
        WireVertex::new(10, [0.0, 0.0, 0.0]),
        WireVertex::new(40, [0.0, 1.0, 0.0]),
        WireVertex::new(20, [1.0, 0.0, 0.0]),
    ];
    (table, records)
}

fn config(template: &str, max_area: Option<f64>) -> DumpMeshConfig {
    DumpMeshConfig {
        nevery: 10,
        file_template: template.into(),
        group: ALL_GROUP,
        max_triangle_area: max_area,
    }
}

#[test]
fn vertices_follow_id_order_and_faces_are_renumbered() {
    let (table, records) = square();
    let mesh = assemble_mesh(&table, &records, &[[10, 20, 30], [40, 10, 30]], None).unwrap();
    assert_eq!(
        mesh.vertices,
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]
    );
    assert_eq!(mesh.faces, vec![[0, 1, 2], [3, 0, 2]]);
}

#[test]
fn degenerate_triangles_are_dropped() {
    let (table, records) = square();
    let tris = [[10, 20, 20], [10, 20, 30], [10, 30, 10]];
    let mesh = assemble_mesh(&table, &records, &tris, None).unwrap();
    assert_eq!(mesh.faces, vec![[0, 1, 2]]);
}

#[test]
fn collinear_triangle_is_degenerate() {
    let table = GlobalVertexTable::from_ids([1, 2, 3]);
    let records = vec![
        WireVertex::new(1, [0.0; 3]),
        WireVertex::new(2, [1.0, 1.0, 1.0]),
        WireVertex::new(3, [3.0, 3.0, 3.0]),
    ];
    let mesh = assemble_mesh(&table, &records, &[[1, 2, 3]], None).unwrap();
    assert!(mesh.faces.is_empty());
}

#[test]
fn oversize_triangles_are_dropped() {
    let (table, records) = square();
    let tris = [[10, 20, 30]];
    assert_eq!(assemble_mesh(&table, &records, &tris, Some(0.5)).unwrap().faces.len(), 1);
    assert!(assemble_mesh(&table, &records, &tris, Some(0.49)).unwrap().faces.is_empty());
}

#[test]
fn triangle_with_unknown_vertex_is_a_fault() {
    let (table, records) = square();
    let err = assemble_mesh(&table, &records, &[[10, 20, 99]], None).unwrap_err();
    assert_eq!(err, StatsError::UnknownVertex(99));
}

#[test]
fn missing_vertex_record_is_a_fault() {
    let (table, mut records) = square();
    records.pop();
    let err = assemble_mesh(&table, &records, &[], None).unwrap_err();
    assert_eq!(err, StatsError::VertexCountMismatch { expected: 4, found: 3 });
}

#[test]
fn dump_before_setup_is_rejected() {
    let dump = DumpMesh::new(config("unused", None)).unwrap();
    let store = EntityStore::new();
    assert_eq!(dump.snapshot(&NoComm, &store), Err(StatsError::NotSetUp));
}

#[test]
fn empty_template_is_rejected() {
    assert!(matches!(DumpMesh::new(config("  ", None)), Err(StatsError::Config(_))));
}

#[test]
fn two_ranks_write_one_file_on_the_coordinator() {
    let template = scratch_path("mesh_e2e").to_string_lossy().into_owned();
    let out = LocalUniverse::run(2, |world| {
        let mut store = EntityStore::new();
        if world.rank() == 0 {
            store.push_with_angles(at(10, [0.0; 3]), vec![[10, 20, 30], [10, 30, 40]]);
            store.push(at(30, [1.0, 1.0, 0.0]));
        } else {
            store.push_with_angles(at(20, [1.0, 0.0, 0.0]), vec![[20, 50, 30], [10, 20, 20]]);
            store.push(at(40, [0.0, 1.0, 0.0]));
            store.push(at(50, [100.0, 0.0, 0.0]));
        }
        let mut dump = DumpMesh::new(config(&template, Some(1.0))).unwrap();
        dump.setup(&world, &store).unwrap();
        let skipped = dump.end_of_step(&world, &store, 15).unwrap();
        let written = dump.end_of_step(&world, &store, 20).unwrap();
        let table: Vec<u64> = dump.vertex_table().unwrap().ids().to_vec();
        (skipped, written, table, dump.tracked_vertices(), dump.triangles().len())
    });

    for (skipped, _, table, tracked, _) in &out {
        assert!(skipped.is_none());
        assert_eq!(table, &vec![10, 20, 30, 40, 50]);
        assert_eq!(*tracked, 5);
    }
    assert_eq!(out[0].4, 4);
    assert_eq!(out[1].4, 0);
    assert!(out[1].1.is_none());

    let path = out[0].1.clone().unwrap();
    assert_eq!(path.file_name().unwrap(), "mesh_e2e.2.obj");
    let text = std::fs::read_to_string(&path).unwrap();
    let want = "# Generated by dump/mesh\n\
                o Mesh\n\
                v 0.000000 0.000000 0.000000\n\
                v 1.000000 0.000000 0.000000\n\
                v 1.000000 1.000000 0.000000\n\
                v 0.000000 1.000000 0.000000\n\
                v 100.000000 0.000000 0.000000\n\
                f 1 2 3\n\
                f 1 3 4\n";
    assert_eq!(text, want);
}

#[test]
fn later_dumps_see_moved_vertices() {
    let template = scratch_path("mesh_moving").to_string_lossy().into_owned();
    let mut store = EntityStore::new();
    store.push_with_angles(at(1, [0.0; 3]), vec![[1, 2, 3]]);
    store.push(at(2, [1.0, 0.0, 0.0]));
    store.push(at(3, [0.0, 1.0, 0.0]));
    let mut dump = DumpMesh::new(config(&template, None)).unwrap();
    dump.setup(&NoComm, &store).unwrap();

    store.entities_mut()[2].x = [0.0, 2.0, 0.5];
    let mesh = dump.snapshot(&NoComm, &store).unwrap().unwrap();
    assert_eq!(mesh.vertices[2], [0.0, 2.0, 0.5]);
    assert_eq!(mesh.faces, vec![[0, 1, 2]]);

    let path = dump.end_of_step(&NoComm, &store, 30).unwrap().unwrap();
    assert!(path.to_string_lossy().ends_with("mesh_moving.3.obj"));
    assert!(std::fs::read_to_string(path).unwrap().contains("v 0.000000 2.000000 0.500000"));
}
