//! The top-level entity store.
//!
//! A [`Storage`] owns every archetype and the handle table mapping entities to their current
//! `(archetype, slot)`. All operations go through it: it finds or creates the archetype matching
//! a component set and delegates row-level work to it.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Storage                                                    │
//! │  handles:    [e0 → (a0, 0), e1 → ✝, e2 → (a1, 0), ...]     │
//! │  archetypes: [a0 {f64}, a1 {f32}, a2 {f64, f32}, ...]      │
//! └───────────────┬────────────────────────────────────────────┘
//!                 │ find_exact / find_containing (linear scan)
//!        ┌────────▼────────┐
//!        │ Archetype       │  packed rows + parallel entity list
//!        └─────────────────┘
//! ```
//!
//! # Errors
//!
//! Programmer errors (unregistered components, duplicate types in a bundle or query, deleted
//! handles, reading an absent component) panic with the text of the matching
//! [`Error`] variant. The `try_*` accessors return the same variants instead. Allocation failure
//! is always returned as [`Error::OutOfMemory`] and leaves the storage unchanged.
//!
//! # Iteration
//!
//! [`Storage::foreach`] borrows the storage mutably for the duration of the walk, so structural
//! changes inside the callback are rejected by the borrow checker. Collect the work and apply it
//! after the loop instead.

use std::{
    collections::HashSet,
    io::{Read, Write},
    ptr::NonNull,
    sync::Arc,
};

use fixedbitset::FixedBitSet;
use log::{debug, trace};

use crate::{
    archetype::{Archetype, ArchetypeId},
    component::{Bundle, Component, ComponentSet, Registry, TypeList},
    entity::Entity,
    error::{Error, Result},
    persist,
    query::{NO_COLUMN, Query},
};

mod config;
mod handles;

pub use config::StorageConfig;
pub(crate) use handles::Handles;
pub use handles::Location;

/// An archetype-based entity-component store.
pub struct Storage {
    /// Component descriptors shared with other storages.
    registry: Arc<Registry>,

    config: StorageConfig,

    /// Archetypes in creation order. `archetypes[i].id().index() == i`.
    archetypes: Vec<Archetype>,

    handles: Handles,
}

impl Storage {
    /// Create an empty storage with the default configuration.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, StorageConfig::default())
    }

    /// Create an empty storage with an explicit configuration.
    pub fn with_config(registry: Arc<Registry>, config: StorageConfig) -> Self {
        Self {
            registry,
            config,
            archetypes: Vec::new(),
            handles: Handles::new(),
        }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[inline]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Create an entity owning every component in `bundle`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the archetype could not grow; nothing is created.
    ///
    /// # Panics
    /// Panics if the bundle repeats a component type or names an unregistered one.
    #[track_caller]
    pub fn add_entity<B: Bundle>(&mut self, bundle: B) -> Result<Entity> {
        let set = B::component_set().map_err(Error::surface)?;
        let index = self.find_or_create(&set).map_err(Error::surface)?;

        let entity = self.handles.next();
        let slot = self.archetypes[index].push(entity, bundle)?;
        self.handles
            .push(Location::new(ArchetypeId::new(index as u32), slot));

        self.check();
        Ok(entity)
    }

    /// Delete an entity and destroy its components. The handle stays reserved.
    ///
    /// # Panics
    /// Panics if the entity is already deleted or was never issued by this storage.
    #[track_caller]
    pub fn delete_entity(&mut self, entity: Entity) {
        let location = self.location(entity);
        self.archetypes[location.archetype().index()].erase(location.slot(), &mut self.handles);
        self.check();
    }

    /// Get a reference to component `C` of an entity.
    ///
    /// # Panics
    /// Panics if the entity is deleted or does not have `C`.
    #[track_caller]
    pub fn get_component<C: Component>(&self, entity: Entity) -> &C {
        match self.try_get_component(entity) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Get a mutable reference to component `C` of an entity.
    ///
    /// # Panics
    /// Panics if the entity is deleted or does not have `C`.
    #[track_caller]
    pub fn get_component_mut<C: Component>(&mut self, entity: Entity) -> &mut C {
        match self.try_get_component_mut(entity) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Get a reference to component `C` of an entity, or the reason it is unavailable.
    pub fn try_get_component<C: Component>(&self, entity: Entity) -> Result<&C> {
        let location = self.handles.get(entity)?;
        match self.archetypes[location.archetype().index()].get::<C>(location.slot()) {
            Some(value) => Ok(value),
            None => Err(self.absent::<C>(entity)),
        }
    }

    /// Get a mutable reference to component `C` of an entity, or the reason it is unavailable.
    pub fn try_get_component_mut<C: Component>(&mut self, entity: Entity) -> Result<&mut C> {
        let location = self.handles.get(entity)?;
        let error = self.absent::<C>(entity);
        self.archetypes[location.archetype().index()]
            .get_mut::<C>(location.slot())
            .ok_or(error)
    }

    /// Determine if an entity owns every component in `L`. Deleted entities own nothing.
    ///
    /// # Panics
    /// Panics if `L` repeats a component type.
    #[track_caller]
    pub fn has_components<L: TypeList>(&self, entity: Entity) -> bool {
        let required = match L::component_set() {
            Ok(set) => set,
            Err(error) => panic!("{error}"),
        };
        let Ok(location) = self.handles.get(entity) else {
            return false;
        };
        let set = self.archetypes[location.archetype().index()].set();
        match required.iter().next() {
            Some(id) if required.len() == 1 => set.contains(id),
            _ => set.contains_all(&required),
        }
    }

    /// Attach `value` to an entity, migrating it to the archetype with `C` added.
    ///
    /// If the entity already has a `C` nothing happens and `value` is dropped.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the destination could not grow. The entity is left in
    /// its original archetype.
    ///
    /// # Panics
    /// Panics if the entity is deleted or `C` is not registered.
    #[track_caller]
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) -> Result<()> {
        let location = self.location(entity);
        let src_index = location.archetype().index();
        let src_set = *self.archetypes[src_index].set();
        if src_set.contains(C::ID) {
            return Ok(());
        }

        let dst_set = src_set.with(C::ID);
        let dst_index = self.find_or_create(&dst_set).map_err(Error::surface)?;
        let (src, dst) = pair_mut(&mut self.archetypes, src_index, dst_index);
        dst.reserve(1)?;
        // Checks the registered type before any bytes move.
        dst.offset_of::<C>();

        let dst_slot = dst.len();
        // SAFETY: dst_slot is reserved and uninitialised. Every source column is live at the
        // source slot and exists in dst; after the loop they are all relocated, so the source
        // row is erased treating every column as moved out.
        let moved = unsafe {
            for column in src.layout().columns() {
                if let (Some(to), Some(from)) = (
                    dst.column_ptr(dst_slot, column.id()),
                    src.column_ptr(location.slot(), column.id()),
                ) {
                    column.info().move_construct(to, from);
                }
            }
            dst.write(dst_slot, value);
            dst.commit_row(entity);
            src.swap_remove(location.slot(), &src_set)
        };

        self.finish_migration(entity, location, dst_index, dst_slot, moved);
        Ok(())
    }

    /// Detach component `C` from an entity, migrating it to the archetype with `C` removed.
    ///
    /// If the entity does not have a `C` nothing happens. If `C` is its only component the
    /// entity is deleted.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the destination could not grow. The entity is left in
    /// its original archetype.
    ///
    /// # Panics
    /// Panics if the entity is deleted.
    #[track_caller]
    pub fn delete_component<C: Component>(&mut self, entity: Entity) -> Result<()> {
        let location = self.location(entity);
        let src_index = location.archetype().index();
        let src_set = *self.archetypes[src_index].set();
        if !src_set.contains(C::ID) {
            return Ok(());
        }

        let dst_set = src_set.without(C::ID);
        if dst_set.is_empty() {
            self.delete_entity(entity);
            return Ok(());
        }

        let dst_index = self.find_or_create(&dst_set).map_err(Error::surface)?;
        let (src, dst) = pair_mut(&mut self.archetypes, src_index, dst_index);
        dst.reserve(1)?;

        let dst_slot = dst.len();
        // SAFETY: as in add_component; the columns of dst are exactly the moved-out columns, and
        // swap_remove destroys the remaining C in the source row.
        let moved = unsafe {
            for column in dst.layout().columns() {
                if let (Some(to), Some(from)) = (
                    dst.column_ptr(dst_slot, column.id()),
                    src.column_ptr(location.slot(), column.id()),
                ) {
                    column.info().move_construct(to, from);
                }
            }
            dst.commit_row(entity);
            src.swap_remove(location.slot(), &dst_set)
        };

        self.finish_migration(entity, location, dst_index, dst_slot, moved);
        Ok(())
    }

    /// Point the migrated entity and the entity that filled its old slot at their new locations.
    fn finish_migration(
        &mut self,
        entity: Entity,
        from: Location,
        dst_index: usize,
        dst_slot: usize,
        moved: Option<Entity>,
    ) {
        if let Some(moved) = moved {
            self.handles.set(moved, from);
        }
        let to = Location::new(ArchetypeId::new(dst_index as u32), dst_slot);
        self.handles.set(entity, to);
        trace!(
            "migrated {entity} from {:?} to {:?}",
            self.archetypes[from.archetype().index()].set(),
            self.archetypes[dst_index].set()
        );
        self.check();
    }

    /// The number of live entities.
    pub fn count_entities(&self) -> usize {
        self.archetypes.iter().map(Archetype::len).sum()
    }

    /// The number of live entities owning every component in `L`.
    ///
    /// # Panics
    /// Panics if `L` repeats a component type.
    #[track_caller]
    pub fn count_components<L: TypeList>(&self) -> usize {
        let required = match L::component_set() {
            Ok(set) => set,
            Err(error) => panic!("{error}"),
        };
        self.find_containing(&required).map(Archetype::len).sum()
    }

    /// Invoke `f` once for every entity matching the query `Q`.
    ///
    /// Archetypes are visited in creation order and slots in ascending order. A query made only
    /// of [`Entity`] visits every live entity in id order.
    ///
    /// # Panics
    /// Panics if `Q` repeats a component type.
    #[track_caller]
    pub fn foreach<'w, Q: Query>(&'w mut self, mut f: impl FnMut(Q::Item<'w>)) {
        let required = match Q::component_set() {
            Ok(set) => set,
            Err(error) => panic!("{error}"),
        };

        if Q::only_entity() {
            let offsets = vec![NO_COLUMN; Q::arity()];
            for (entity, _) in self.handles.live() {
                // SAFETY: entity parameters never read the row.
                f(unsafe { Q::fetch(entity, NonNull::dangling(), &offsets) });
            }
            return;
        }

        let mut offsets = Vec::new();
        for archetype in self.archetypes.iter() {
            if archetype.is_empty() || !archetype.set().contains_all(&required) {
                continue;
            }
            offsets.clear();
            Q::offsets(archetype.layout(), &mut offsets);
            for (slot, entity) in archetype.entities().iter().enumerate() {
                // SAFETY: the slot is live, offsets come from this archetype's layout, and the
                // query names each component once. `&'w mut self` keeps the rows in place and
                // unaliased for 'w.
                f(unsafe { Q::fetch(*entity, archetype.row_ptr(slot), &offsets) });
            }
        }
    }

    /// Iterate every live entity in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.handles.live().map(|(entity, _)| entity)
    }

    /// Determine if an entity handle refers to a live entity of this storage.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.handles.is_alive(entity)
    }

    /// Get the current location of a live entity.
    pub fn locate(&self, entity: Entity) -> Result<Location> {
        self.handles.get(entity)
    }

    /// The number of archetypes, including empty ones.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All archetypes in creation order.
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Delete every entity. Archetypes and their buffers are kept, and ids are not reused.
    pub fn clear(&mut self) {
        for archetype in self.archetypes.iter_mut() {
            archetype.clear();
        }
        self.handles.clear();
    }

    /// Copy the storage, copy-constructing every live component.
    ///
    /// Fails with [`Error::NotCloneable`] if any archetype holds a component without a copy
    /// callback, even if that archetype is empty.
    pub fn try_clone(&self) -> Result<Self> {
        let archetypes = self
            .archetypes
            .iter()
            .map(Archetype::try_clone)
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "cloned storage with {} archetypes and {} entities",
            archetypes.len(),
            self.count_entities()
        );
        Ok(Self {
            registry: Arc::clone(&self.registry),
            config: self.config,
            archetypes,
            handles: self.handles.clone(),
        })
    }

    /// Write every persistable archetype to `out`. See [`persist::write`].
    pub fn save<W: Write>(&self, out: &mut W, version: u32) -> Result<()> {
        persist::write(self, out, version)
    }

    /// Read a storage written by [`save`](Self::save). See [`persist::read`].
    pub fn load<R: Read>(registry: Arc<Registry>, input: &mut R, version: u32) -> Result<Self> {
        persist::read(registry, input, version)
    }

    /// Check the handle table against every archetype.
    ///
    /// # Panics
    /// Panics if an archetype fails [`Archetype::verify_invariants`], a live handle does not point
    /// at a slot owned by that entity, a slot owner's handle points elsewhere, or two archetypes
    /// share a component set.
    pub fn verify_invariants(&self) {
        let mut seen = FixedBitSet::with_capacity(self.handles.len());
        let mut sets = HashSet::with_capacity(self.archetypes.len());
        for (index, archetype) in self.archetypes.iter().enumerate() {
            assert_eq!(archetype.id().index(), index, "archetype id out of place");
            archetype.verify_invariants();
            assert!(
                sets.insert(*archetype.set()),
                "two archetypes share component set {:?}",
                archetype.set()
            );
            for (slot, entity) in archetype.entities().iter().enumerate() {
                assert_eq!(
                    self.handles.get(*entity).ok(),
                    Some(Location::new(archetype.id(), slot)),
                    "{entity} is stored at slot {slot} of archetype {index} but its handle disagrees"
                );
                assert!(!seen.put(entity.index()), "{entity} is stored twice");
            }
        }
        for (entity, location) in self.handles.live() {
            assert!(
                seen.contains(entity.index()),
                "{entity} points at {location:?} but no archetype stores it"
            );
        }
    }

    /// Run [`verify_invariants`](Self::verify_invariants) if the configuration asks for it.
    #[inline]
    pub(crate) fn check(&self) {
        if self.config.verify_invariants() {
            self.verify_invariants();
        }
    }

    /// Find the archetype whose set is exactly `set`.
    pub(crate) fn find_exact(&self, set: &ComponentSet) -> Option<usize> {
        self.archetypes.iter().position(|a| a.set() == set)
    }

    /// Iterate the archetypes whose set contains `set`.
    pub(crate) fn find_containing<'a>(
        &'a self,
        set: &'a ComponentSet,
    ) -> impl Iterator<Item = &'a Archetype> + 'a {
        self.archetypes
            .iter()
            .filter(move |a| a.set().contains_all(set))
    }

    /// Find the archetype for `set`, creating it if needed. `set` must not be empty.
    pub(crate) fn find_or_create(&mut self, set: &ComponentSet) -> Result<usize> {
        assert!(!set.is_empty(), "entities need at least one component");
        if let Some(index) = self.find_exact(set) {
            return Ok(index);
        }

        let infos = self.registry.infos(set)?;
        let id = ArchetypeId::new(self.archetypes.len() as u32);
        let archetype = Archetype::new(id, &infos, self.config.min_archetype_capacity())?;
        debug!(
            "created archetype {} for {:?} (stride {}, capacity {})",
            id.id(),
            set,
            archetype.layout().stride(),
            archetype.capacity()
        );
        self.archetypes.push(archetype);
        Ok(id.index())
    }

    /// Borrow one archetype together with the handle table.
    pub(crate) fn archetype_and_handles(&mut self, index: usize) -> (&mut Archetype, &mut Handles) {
        (&mut self.archetypes[index], &mut self.handles)
    }

    /// Look up a live entity, trapping on dead handles.
    #[track_caller]
    fn location(&self, entity: Entity) -> Location {
        match self.handles.get(entity) {
            Ok(location) => location,
            Err(error) => panic!("{error}"),
        }
    }

    /// The error reported when an entity lacks `C`.
    fn absent<C: Component>(&self, entity: Entity) -> Error {
        if self.registry.is_registered(C::ID) {
            Error::ComponentNotPresent {
                entity,
                component: C::ID,
            }
        } else {
            Error::NotRegistered(C::ID)
        }
    }
}

impl Clone for Storage {
    /// # Panics
    /// Panics if a component lacks a copy callback. Use [`Storage::try_clone`] to handle that.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(storage) => storage,
            Err(error) => panic!("{error}"),
        }
    }
}

/// Borrow two distinct archetypes mutably.
fn pair_mut(archetypes: &mut [Archetype], a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = archetypes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
