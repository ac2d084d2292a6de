//! Local entity view supplied by the physics engine.
//!
//! The aggregation layer never creates or destroys entities; it only reads the
//! records the owning process currently holds.

/// Group membership bit mask.
pub type GroupBits = u32;

/// Bit carried by every entity (the reference "all" group).
pub const ALL_GROUP: GroupBits = 1;

/// One locally owned particle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entity {
    /// Global particle identifier.
    pub tag: u64,
    /// Molecule identifier; `0` means "not part of a molecule".
    pub molecule: u64,
    /// Group membership bits.
    pub mask: GroupBits,
    pub x: [f64; 3],
    pub v: [f64; 3],
}

impl Entity {
    /// Entity in the "all" group only, at rest.
    pub fn new(tag: u64, x: [f64; 3]) -> Self {
        Self {
            tag,
            mask: ALL_GROUP,
            x,
            ..Default::default()
        }
    }

    pub fn with_velocity(mut self, v: [f64; 3]) -> Self {
        self.v = v;
        self
    }

    pub fn with_molecule(mut self, molecule: u64) -> Self {
        self.molecule = molecule;
        self
    }

    /// Add `bits` to the membership mask.
    pub fn in_groups(mut self, bits: GroupBits) -> Self {
        self.mask |= bits;
        self
    }

    #[inline]
    pub fn belongs_to(&self, bits: GroupBits) -> bool {
        self.mask & bits != 0
    }
}

/// Enumerates the entities owned by the calling process.
pub trait EntitySource {
    fn entities(&self) -> &[Entity];

    /// Angle triples (raw tags) anchored at local entity `index`.
    fn angles(&self, _index: usize) -> &[[u64; 3]] {
        &[]
    }
}

impl EntitySource for [Entity] {
    fn entities(&self) -> &[Entity] {
        self
    }
}

impl EntitySource for Vec<Entity> {
    fn entities(&self) -> &[Entity] {
        self
    }
}

/// Owned entities plus their angle lists.
#[derive(Clone, Debug, Default)]
pub struct EntityStore {
    entities: Vec<Entity>,
    angles: Vec<Vec<[u64; 3]>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
        self.angles.push(Vec::new());
    }

    pub fn push_with_angles(&mut self, entity: Entity, angles: Vec<[u64; 3]>) {
        self.entities.push(entity);
        self.angles.push(angles);
    }

    /// Mutable access for the engine to move particles between steps.
    pub fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<Entity> for EntityStore {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut store = EntityStore::new();
        for e in iter {
            store.push(e);
        }
        store
    }
}

impl EntitySource for EntityStore {
    fn entities(&self) -> &[Entity] {
        &self.entities
    }

    fn angles(&self, index: usize) -> &[[u64; 3]] {
        self.angles.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}
