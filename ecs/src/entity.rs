//! Entity handles.
//!
//! An [`Entity`] is a lightweight, copyable handle wrapping a 32-bit identifier. Identifiers are
//! handed out by a [`Storage`](crate::storage::Storage) from a monotonically increasing counter and
//! are never reused: deleting an entity leaves a tombstone behind, and any later use of the handle
//! is detected as [`Error::EntityDeleted`](crate::error::Error::EntityDeleted).
//!
//! Unlike the entity's archetype slot, which moves whenever rows are erased or migrated, the handle
//! is stable for the life of the storage.

use std::fmt;

/// A stable handle to one logical record in a storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u32);

impl Entity {
    /// Construct an entity from a raw identifier.
    #[inline]
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw identifier of this entity.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.0
    }

    /// Get the index of this entity in the storage's handle table.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}", self.0)
    }
}
