#![allow(dead_code)]
use region_stats::entity::Entity;
use region_stats::region::Region;

/// Axis-aligned box `[lo, hi)` with a known interior volume.
#[derive(Clone, Copy, Debug)]
pub struct Block {
    pub lo: [f64; 3],
    pub hi: [f64; 3],
}

impl Block {
    pub fn new(lo: [f64; 3], hi: [f64; 3]) -> Self {
        Self { lo, hi }
    }

    pub fn unit() -> Self {
        Self::new([0.0; 3], [1.0; 3])
    }
}

impl Region for Block {
    fn matches(&self, x: f64, y: f64, z: f64) -> bool {
        [x, y, z]
            .iter()
            .zip(self.lo.iter().zip(&self.hi))
            .all(|(&p, (&lo, &hi))| p >= lo && p < hi)
    }

    fn volume_interior(&self) -> Option<f64> {
        Some((0..3).map(|k| self.hi[k] - self.lo[k]).product())
    }
}

/// Entity `tag` at `x`, in the "all" group.
pub fn at(tag: u64, x: [f64; 3]) -> Entity {
    Entity::new(tag, x)
}

/// Entity `tag` at rest at the origin, in molecule `molecule`.
pub fn mol(tag: u64, molecule: u64) -> Entity {
    Entity::new(tag, [0.0; 3]).with_molecule(molecule)
}

/// Deal `items` round-robin onto `ranks` ranks.
pub fn deal<T: Clone>(items: &[T], ranks: usize) -> Vec<Vec<T>> {
    let mut out = vec![Vec::new(); ranks];
    for (i, item) in items.iter().enumerate() {
        out[i % ranks].push(item.clone());
    }
    out
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}

/// Fresh path under the system temp dir, unique per test process.
pub fn scratch_path(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("region-stats-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}
