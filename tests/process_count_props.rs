//! Results must not depend on how entities are spread over ranks.

mod util;
use proptest::prelude::*;
use region_stats::algs::communicator::{Communicator, LocalUniverse};
use region_stats::algs::gather::all_gather_union;
use region_stats::algs::molecule_counter::MoleculeCounter;
use region_stats::calc::DensityCalculator;
use region_stats::entity::{ALL_GROUP, Entity};
use std::collections::BTreeSet;
use util::*;

fn entities(coords: &[(f64, f64, f64)], molecules: &[u64]) -> Vec<Entity> {
    coords
        .iter()
        .zip(molecules.iter().cycle())
        .enumerate()
        .map(|(i, (&(x, y, z), &m))| at(i as u64 + 1, [x, y, z]).with_molecule(m))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn density_is_independent_of_rank_count(
        coords in prop::collection::vec((-0.5f64..1.5, -0.5f64..1.5, 0.0f64..1.0), 0..40),
        ranks in 1usize..5,
    ) {
        let all = entities(&coords, &[0]);
        let inside = all.iter().filter(|e| e.x.iter().all(|&c| (0.0..1.0).contains(&c))).count();
        let pieces = deal(&all, ranks);
        let out = LocalUniverse::run(ranks, |world| {
            let local = &pieces[world.rank()];
            let mut calc = DensityCalculator::density(Block::unit(), ALL_GROUP, 1, 1).unwrap();
            calc.setup(&world, local, 0).unwrap();
            calc.run(&world, local, 1).unwrap();
            calc.aggregation().density()
        });
        for density in out {
            prop_assert_eq!(density, inside as f64);
        }
    }

    #[test]
    fn molecule_table_is_independent_of_rank_count(
        molecules in prop::collection::vec(0u64..60, 1..30),
        ranks in 1usize..5,
    ) {
        let coords = vec![(0.0, 0.0, 0.0); molecules.len()];
        let all = entities(&coords, &molecules);
        let distinct: BTreeSet<u64> = molecules.iter().copied().filter(|&m| m != 0).collect();
        let pieces = deal(&all, ranks);
        let out = LocalUniverse::run(ranks, |world| {
            let mut counter = MoleculeCounter::new();
            let n = counter.run(&world, &pieces[world.rank()], ALL_GROUP).unwrap();
            let dense: Vec<Option<usize>> = distinct.iter().map(|&m| counter.try_dense_index(m)).collect();
            (n, dense)
        });
        let want: Vec<Option<usize>> = (0..distinct.len()).map(Some).collect();
        for (n, dense) in out {
            prop_assert_eq!(n, distinct.len());
            prop_assert_eq!(dense, want.clone());
        }
    }

    #[test]
    fn set_gather_is_the_serial_union(
        items in prop::collection::vec(0u32..1000, 0..50),
        ranks in 1usize..5,
    ) {
        let pieces = deal(&items, ranks);
        let out = LocalUniverse::run(ranks, |world| {
            let local: BTreeSet<u32> = pieces[world.rank()].iter().copied().collect();
            all_gather_union(&local, &world).unwrap()
        });
        let want: BTreeSet<u32> = items.into_iter().collect();
        for got in out {
            prop_assert_eq!(got, want.clone());
        }
    }
}
