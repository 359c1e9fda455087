use crate::storage::archetype;

/// A storage slot: the dense index of an entity within its archetype, spanning the
/// archetype's chunks (`chunk = slot / CHUNK_CAPACITY`, `row = slot % CHUNK_CAPACITY`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

impl From<usize> for Slot {
    /// Get a slot from a usize index.
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

impl Slot {
    /// Construct a new slot from a dense index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the dense index of this slot.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The location an entity is stored at: its archetype and the slot within it. This gives
/// near constant time lookups for any entity in the world's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// The archetype the entity belongs to.
    archetype: archetype::Id,

    /// The slot the entity occupies within the archetype.
    slot: Slot,
}

impl Location {
    /// Create a new location from an archetype and slot.
    #[inline]
    pub const fn new(archetype: archetype::Id, slot: Slot) -> Self {
        Self { archetype, slot }
    }

    /// Get the archetype id for this location.
    #[inline]
    pub fn archetype(&self) -> archetype::Id {
        self.archetype
    }

    /// Get the slot for this location.
    #[inline]
    pub fn slot(&self) -> Slot {
        self.slot
    }
}
