use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use region_stats::algs::communicator::{Communicator, LocalUniverse};
use region_stats::algs::gather::all_gather_union;
use region_stats::algs::molecule_counter::MoleculeCounter;
use region_stats::entity::{ALL_GROUP, Entity};

fn bench_all_gather(c: &mut Criterion) {
    let mut group = c.benchmark_group("all_gather_union");

    for &(ranks, per_rank) in &[(2usize, 1_000usize), (4, 1_000), (4, 50_000)] {
        group.bench_with_input(
            BenchmarkId::new(format!("r{ranks}"), per_rank),
            &(ranks, per_rank),
            |b, &(ranks, per_rank)| {
                b.iter(|| {
                    LocalUniverse::run(ranks, |world| {
                        let local: Vec<u64> = (0..per_rank as u64).collect();
                        black_box(all_gather_union(&local, &world).unwrap().len())
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_molecule_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("molecule_counter");

    // sparse ids: span grows with the stride, molecule count does not
    for &stride in &[1u64, 64, 1024] {
        group.bench_with_input(BenchmarkId::new("stride", stride), &stride, |b, &stride| {
            b.iter(|| {
                LocalUniverse::run(4, |world| {
                    let local: Vec<Entity> = (0..2_000u64)
                        .map(|i| {
                            let id = (i * 4 + world.rank() as u64) * stride + 1;
                            Entity::new(id, [0.0; 3]).with_molecule(id)
                        })
                        .collect();
                    let mut counter = MoleculeCounter::new();
                    black_box(counter.run(&world, &local, ALL_GROUP).unwrap())
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_all_gather, bench_molecule_counter);
criterion_main!(benches);
