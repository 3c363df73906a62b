//! Archetype storage: one packed row buffer per unique component set.
//!
//! An [`Archetype`] owns every entity that has exactly its component set. Each entity occupies one
//! row (a *slot*) of a contiguous buffer; a row holds every component of the set at the offsets
//! computed by the [`RowLayout`] planner. A parallel vector records which entity owns each slot.
//!
//! ```text
//! RowLayout { f64 @ 0, f32 @ 8, bool @ 12 }, stride 16
//!
//!  slot 0            slot 1            slot 2
//! ┌────────┬────┬─┬─┬────────┬────┬─┬─┬────────┬────┬─┬─┐
//! │  f64   │f32 │b│ │  f64   │f32 │b│ │  f64   │f32 │b│ │  ...  capacity
//! └────────┴────┴─┴─┴────────┴────┴─┴─┴────────┴────┴─┴─┘
//! entities: [e4, e9, e2]
//! ```
//!
//! Slots are not stable: erasing a slot moves the last row into the hole. The handle table in
//! [`Storage`](crate::storage::Storage) is updated in the same call so it never points at a stale
//! slot.

use std::{any::TypeId, ptr::NonNull};

use log::trace;

use crate::{
    component::{Bundle, Component, ComponentId, ComponentSet, Info, Target},
    entity::Entity,
    error::{Error, Result},
    storage::{Handles, Location},
};

mod layout;
mod mem;

pub use layout::{Column, RowLayout};
use mem::RowMemory;

/// The smallest capacity an archetype buffer is ever allocated with.
pub const MIN_CAPACITY: usize = 32;

/// Index of an archetype inside its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn id(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// All entities sharing one component set, stored as packed rows.
pub struct Archetype {
    id: ArchetypeId,
    layout: RowLayout,
    memory: RowMemory,

    /// Owner of each initialised slot. `entities.len()` is the instance count.
    entities: Vec<Entity>,

    /// Capacity of a fresh buffer, a power of two.
    min_capacity: usize,
}

impl Archetype {
    /// Create an archetype for a non-empty set of component descriptors and allocate its first
    /// `min_capacity` rows.
    pub fn new(id: ArchetypeId, infos: &[Info], min_capacity: usize) -> Result<Self> {
        debug_assert!(!infos.is_empty(), "archetypes always hold at least one component");
        let min_capacity = min_capacity.max(MIN_CAPACITY).next_power_of_two();
        let layout = RowLayout::plan(infos);
        let mut memory = RowMemory::new(layout.stride(), layout.align());
        memory.grow_to(min_capacity)?;
        Ok(Self {
            id,
            layout,
            memory,
            entities: Vec::new(),
            min_capacity,
        })
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The component set identifying this archetype.
    #[inline]
    pub fn set(&self) -> &ComponentSet {
        self.layout.set()
    }

    #[inline]
    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    /// The number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The number of rows the buffer can hold without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.memory.capacity()
    }

    /// The owners of each live slot, in slot order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Make room for at least `additional` more rows.
    ///
    /// Capacity grows to the next power of two that fits. On allocation failure nothing changes.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .len()
            .checked_add(additional)
            .ok_or(Error::OutOfMemory { bytes: usize::MAX })?;
        if needed <= self.capacity() {
            return Ok(());
        }
        let capacity = needed
            .checked_next_power_of_two()
            .ok_or(Error::OutOfMemory { bytes: usize::MAX })?
            .max(self.min_capacity);
        trace!(
            "growing archetype {:?} {:?} from {} to {} rows",
            self.id,
            self.set(),
            self.capacity(),
            capacity
        );
        // Both allocations are fallible; the entity list goes first so a failure leaves the row
        // buffer untouched.
        self.entities
            .try_reserve(capacity - self.entities.len())
            .map_err(|_| Error::OutOfMemory {
                bytes: capacity.saturating_mul(size_of::<Entity>()),
            })?;
        self.memory.grow_to(capacity)?;
        Ok(())
    }

    /// Append a row for `entity`, constructing each component of `bundle` in place.
    ///
    /// The bundle's component set must equal this archetype's set. Returns the new slot.
    pub fn push<B: Bundle>(&mut self, entity: Entity, bundle: B) -> Result<usize> {
        self.reserve(1)?;
        let slot = self.len();
        // SAFETY: reserve guaranteed the slot is inside the buffer, and it is past the last live
        // row so it is uninitialised.
        unsafe {
            self.write(slot, bundle);
            Ok(self.commit_row(entity))
        }
    }

    /// Construct each component of `bundle` in place at `slot`.
    ///
    /// # Safety
    /// `slot` must be below capacity and the columns `bundle` writes must be uninitialised there.
    pub(crate) unsafe fn write<B: Bundle>(&mut self, slot: usize, bundle: B) {
        let mut writer = SlotWriter {
            layout: &self.layout,
            row: self.memory.row_ptr(slot),
        };
        bundle.write(&mut writer);
    }

    /// Make the row at slot `len()` live and owned by `entity`. Returns its slot.
    ///
    /// # Safety
    /// Every column of the row at `len()` must be initialised.
    pub(crate) unsafe fn commit_row(&mut self, entity: Entity) -> usize {
        debug_assert!(self.len() < self.capacity());
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Get a pointer to the start of a row.
    #[inline]
    pub(crate) fn row_ptr(&self, slot: usize) -> NonNull<u8> {
        self.memory.row_ptr(slot)
    }

    /// Get a pointer to a component inside a row, if the archetype has that component.
    #[inline]
    pub(crate) fn column_ptr(&self, slot: usize, id: ComponentId) -> Option<NonNull<u8>> {
        let offset = self.layout.offset_of(id)?;
        // SAFETY: offset lies inside the row.
        Some(unsafe { self.row_ptr(slot).add(offset) })
    }

    /// Get the offset of component `C`, if present.
    ///
    /// # Panics
    /// Panics if a different Rust type is registered under `C::ID`.
    #[track_caller]
    pub fn offset_of<C: Component>(&self) -> Option<usize> {
        let column = self.layout.column(C::ID)?;
        assert_type::<C>(column.info());
        Some(column.offset())
    }

    /// Get a reference to component `C` of the entity at `slot`.
    pub fn get<C: Component>(&self, slot: usize) -> Option<&C> {
        if slot >= self.len() {
            return None;
        }
        let offset = self.offset_of::<C>()?;
        // SAFETY: slot is live, so every column is initialised, and the type was checked.
        Some(unsafe { self.row_ptr(slot).add(offset).cast::<C>().as_ref() })
    }

    /// Get a mutable reference to component `C` of the entity at `slot`.
    pub fn get_mut<C: Component>(&mut self, slot: usize) -> Option<&mut C> {
        if slot >= self.len() {
            return None;
        }
        let offset = self.offset_of::<C>()?;
        // SAFETY: as in get, and &mut self gives exclusive access to the row.
        Some(unsafe { self.row_ptr(slot).add(offset).cast::<C>().as_mut() })
    }

    /// Get a reference to component `C` of the entity at `slot`.
    ///
    /// # Panics
    /// Panics with [`Error::ComponentNotPresent`] if the archetype does not hold `C`.
    #[track_caller]
    pub fn component<C: Component>(&self, slot: usize) -> &C {
        match self.get::<C>(slot) {
            Some(value) => value,
            None => panic!(
                "{}",
                Error::ComponentNotPresent {
                    entity: self.entities[slot],
                    component: C::ID,
                }
            ),
        }
    }

    /// Remove the entity at `slot`, destroying its components.
    ///
    /// The last row moves into the hole and its entity's handle is updated; the removed entity's
    /// handle is tombstoned.
    pub(crate) fn erase(&mut self, slot: usize, handles: &mut Handles) {
        let removed = self.entities[slot];
        if let Some(moved) = self.swap_remove(slot, &ComponentSet::EMPTY) {
            handles.set(moved, Location::new(self.id, slot));
        }
        handles.tombstone(removed);
    }

    /// Remove the row at `slot` after the components in `moved_out` were relocated elsewhere.
    ///
    /// Components not in `moved_out` are destroyed. If another row was moved into `slot` its
    /// entity is returned; the caller must update that entity's location.
    pub(crate) fn swap_remove(&mut self, slot: usize, moved_out: &ComponentSet) -> Option<Entity> {
        debug_assert!(slot < self.len(), "slot {slot} out of bounds");
        let last = self.len() - 1;
        let dst = self.row_ptr(slot);

        if slot == last {
            for column in self.layout.columns() {
                if !moved_out.contains(column.id()) {
                    // SAFETY: the column is live at this slot.
                    unsafe { column.info().destroy(dst.add(column.offset())) };
                }
            }
            self.entities.pop();
            return None;
        }

        let src = self.row_ptr(last);
        for column in self.layout.columns() {
            // SAFETY: src is a live row distinct from dst. Columns in moved_out are uninitialised
            // at dst, every other column is still live there.
            unsafe {
                let (dst, src) = (dst.add(column.offset()), src.add(column.offset()));
                if moved_out.contains(column.id()) {
                    column.info().move_construct(dst, src);
                } else {
                    column.info().move_assign(dst, src);
                }
            }
        }
        self.entities.swap_remove(slot);

        #[cfg(debug_assertions)]
        self.verify_invariants();

        Some(self.entities[slot])
    }

    /// Destroy every live component. Capacity is unchanged.
    pub fn clear(&mut self) {
        let count = self.entities.len();
        self.entities.clear();
        for slot in 0..count {
            let row = self.row_ptr(slot);
            for column in self.layout.columns() {
                // SAFETY: slot was live before the entity list was cleared.
                unsafe { column.info().destroy(row.add(column.offset())) };
            }
        }
    }

    /// Copy every live row into a new archetype with the same id and capacity.
    ///
    /// Fails with [`Error::NotCloneable`] if the archetype holds rows and any component lacks a
    /// copy callback. An empty archetype always copies.
    pub fn try_clone(&self) -> Result<Self> {
        if !self.is_empty() {
            if let Some(column) = self
                .layout
                .columns()
                .iter()
                .find(|c| !c.info().is_cloneable())
            {
                return Err(Error::NotCloneable(column.id()));
            }
        }

        let mut memory = RowMemory::new(self.layout.stride(), self.layout.align());
        memory.grow_to(self.capacity())?;
        let mut copy = Self {
            id: self.id,
            layout: self.layout.clone(),
            memory,
            entities: Vec::with_capacity(self.entities.capacity()),
            min_capacity: self.min_capacity,
        };
        for (slot, entity) in self.entities.iter().enumerate() {
            let (src, dst) = (self.row_ptr(slot), copy.row_ptr(slot));
            for column in self.layout.columns() {
                // SAFETY: src slot is live, dst slot is uninitialised and inside capacity.
                unsafe {
                    column
                        .info()
                        .copy_construct(dst.add(column.offset()), src.add(column.offset()))
                };
            }
            // SAFETY: every column of the row was just constructed.
            unsafe { copy.commit_row(*entity) };
        }
        Ok(copy)
    }

    /// Verify the entity list fits in the buffer.
    ///
    /// # Panics
    /// Panics if the instance count exceeds capacity or the set is empty.
    pub fn verify_invariants(&self) {
        assert!(
            self.len() <= self.capacity(),
            "archetype {:?} holds {} entities but has capacity {}",
            self.id,
            self.len(),
            self.capacity()
        );
        assert!(!self.set().is_empty(), "archetype {:?} has no components", self.id);
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Writes bundle values into one row.
struct SlotWriter<'a> {
    layout: &'a RowLayout,
    row: NonNull<u8>,
}

impl Target for SlotWriter<'_> {
    #[track_caller]
    fn write<C: Component>(&mut self, value: C) {
        let Some(column) = self.layout.column(C::ID) else {
            panic!(
                "archetype {:?} has no column for component {}",
                self.layout.set(),
                C::ID
            );
        };
        assert_type::<C>(column.info());
        // SAFETY: the column is aligned for C and uninitialised in this row.
        unsafe { self.row.add(column.offset()).cast::<C>().write(value) };
    }
}

#[track_caller]
fn assert_type<C: Component>(info: &Info) {
    assert!(
        info.type_id() == TypeId::of::<C>(),
        "component {} is registered to `{}`, not `{}`",
        C::ID,
        info.name(),
        std::any::type_name::<C>()
    );
}
