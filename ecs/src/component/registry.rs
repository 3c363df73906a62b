use std::{
    any::TypeId,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use dashmap::DashMap;
use log::debug;

use crate::{
    component::{Component, ComponentId, ComponentSet, Info, MAX_COMPONENTS, TypeList},
    error::{Error, Result},
};

/// A thread-safe table of component descriptors, indexed by [`ComponentId`].
///
/// Every component type must be registered once before any storage touches it. A registry is
/// usually shared between storages through an `Arc`, and must outlive all of them.
///
/// Lookups by Rust type go through a `DashMap` so they never contend with each other; the
/// descriptor table sits behind a `RwLock` that is only written during registration.
pub struct Registry {
    /// Map from Rust TypeId to the id the type registered under.
    type_map: DashMap<TypeId, ComponentId>,

    /// Descriptor table, one slot per possible component id.
    components: RwLock<Vec<Option<Info>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            components: RwLock::new(vec![None; MAX_COMPONENTS]),
        }
    }

    /// Register component type `C` at `C::ID`.
    ///
    /// Registering the same type twice is a no-op. Registering a different type at an id that is
    /// already taken fails with [`Error::AlreadyRegistered`].
    pub fn try_register<C: Component>(&self) -> Result<ComponentId> {
        self.register_info(C::info())
    }

    /// Register component type `C` at `C::ID`.
    ///
    /// # Panics
    /// Panics if a different type is already registered at `C::ID`.
    #[track_caller]
    pub fn register<C: Component>(&self) -> ComponentId {
        match self.try_register::<C>() {
            Ok(id) => id,
            Err(error) => panic!("{error}"),
        }
    }

    /// Install a hand-built descriptor at `info.id()`.
    pub fn register_info(&self, info: Info) -> Result<ComponentId> {
        let id = info.id();
        let mut components = self.write();
        match &components[id.index()] {
            Some(existing) if existing.type_id() == info.type_id() => return Ok(id),
            Some(existing) => {
                return Err(Error::AlreadyRegistered {
                    id,
                    existing: existing.name(),
                    requested: info.name(),
                });
            }
            None => {}
        }

        components[id.index()] = Some(info);
        self.type_map.insert(info.type_id(), id);
        debug!(
            "registered component {id} as `{}` ({} bytes, align {})",
            info.name(),
            info.size(),
            info.align()
        );
        Ok(id)
    }

    /// Get the descriptor registered at `id`.
    ///
    /// # Panics
    /// Panics if nothing is registered at `id`.
    #[track_caller]
    pub fn info(&self, id: ComponentId) -> Info {
        match self.try_info(id) {
            Ok(info) => info,
            Err(error) => panic!("{error}"),
        }
    }

    /// Get the descriptor registered at `id`, or [`Error::NotRegistered`].
    #[inline]
    pub fn try_info(&self, id: ComponentId) -> Result<Info> {
        self.read()[id.index()].ok_or(Error::NotRegistered(id))
    }

    /// Determine if a descriptor is registered at `id`.
    #[inline]
    pub fn is_registered(&self, id: ComponentId) -> bool {
        self.read()[id.index()].is_some()
    }

    /// Get the id the Rust type `C` registered under, if it has been registered.
    #[inline]
    pub fn id_of<C: Component>(&self) -> Option<ComponentId> {
        self.type_map
            .get(&TypeId::of::<C>())
            .map(|entry| *entry.value())
    }

    /// Get the number of registered component types.
    pub fn len(&self) -> usize {
        self.read().iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns true if no component type has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold a type list into a component set. [`Entity`](crate::entity::Entity) entries are
    /// skipped.
    ///
    /// # Panics
    /// Panics if the list repeats a component type or names an unregistered one.
    #[track_caller]
    pub fn bitset_of<L: TypeList>(&self) -> ComponentSet {
        match L::component_set().and_then(|set| self.check_registered(&set).map(|_| set)) {
            Ok(set) => set,
            Err(error) => panic!("{error}"),
        }
    }

    /// Check that every id in `set` has a descriptor.
    pub(crate) fn check_registered(&self, set: &ComponentSet) -> Result<()> {
        let components = self.read();
        match set.iter().find(|id| components[id.index()].is_none()) {
            Some(id) => Err(Error::NotRegistered(id)),
            None => Ok(()),
        }
    }

    /// Collect the descriptors for every id in `set`, in ascending id order.
    pub(crate) fn infos(&self, set: &ComponentSet) -> Result<Vec<Info>> {
        let components = self.read();
        set.iter()
            .map(|id| components[id.index()].ok_or(Error::NotRegistered(id)))
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Option<Info>>> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Option<Info>>> {
        self.components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::{Component, entity::Entity};

    #[derive(Component, Debug)]
    #[component(id = 0)]
    struct Position(f32, f32);

    #[derive(Component, Debug)]
    #[component(id = 1)]
    struct Velocity(f32, f32);

    #[derive(Component, Debug)]
    #[component(id = 1)]
    struct Impostor(u8);

    #[derive(Component, Debug)]
    #[component(id = 2)]
    struct Health(u32);

    #[test]
    fn component_registration() {
        // Given
        let registry = Registry::new();

        // When
        let pos_id = registry.register::<Position>();
        let vel_id = registry.register::<Velocity>();

        // Then
        assert_eq!(pos_id, ComponentId::new(0));
        assert_eq!(vel_id, ComponentId::new(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id_of::<Position>(), Some(pos_id));
        assert_eq!(registry.info(vel_id).type_id(), TypeId::of::<Velocity>());

        // Then - Registering the same type again is a no-op
        assert_eq!(registry.register::<Position>(), pos_id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn colliding_registration_is_rejected() {
        // Given
        let registry = Registry::new();
        registry.register::<Velocity>();

        // When
        let result = registry.try_register::<Impostor>();

        // Then
        match result {
            Err(Error::AlreadyRegistered {
                id,
                existing,
                requested,
            }) => {
                assert_eq!(id, ComponentId::new(1));
                assert!(existing.ends_with("Velocity"));
                assert!(requested.ends_with("Impostor"));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(registry.id_of::<Impostor>(), None);
    }

    #[test]
    #[should_panic(expected = "is already registered to")]
    fn register_traps_on_collision() {
        let registry = Registry::new();
        registry.register::<Velocity>();
        registry.register::<Impostor>();
    }

    #[test]
    fn unregistered_lookups() {
        // Given
        let registry = Registry::new();

        // Then
        assert!(registry.is_empty());
        assert!(!registry.is_registered(Health::ID));
        assert_eq!(registry.id_of::<Health>(), None);
        assert!(matches!(
            registry.try_info(Health::ID),
            Err(Error::NotRegistered(id)) if id == Health::ID
        ));
    }

    #[test]
    #[should_panic(expected = "component 2 is not registered")]
    fn info_traps_when_unregistered() {
        Registry::new().info(Health::ID);
    }

    #[test]
    fn bitset_of_skips_entity() {
        // Given
        let registry = Registry::new();
        registry.register::<Position>();
        registry.register::<Health>();

        // When
        let set = registry.bitset_of::<(Entity, Position, Health)>();

        // Then
        assert_eq!(set, ComponentSet::from_ids([Position::ID, Health::ID]));
    }

    #[test]
    #[should_panic(expected = "appears more than once")]
    fn bitset_of_traps_on_duplicates() {
        let registry = Registry::new();
        registry.register::<Position>();
        registry.bitset_of::<(Position, Position)>();
    }

    #[test]
    fn concurrent_registration() {
        // Given
        let registry = Arc::new(Registry::new());

        // When - Multiple threads register components concurrently
        let handles: Vec<_> = (0..9)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || match i % 3 {
                    0 => registry.register::<Position>(),
                    1 => registry.register::<Velocity>(),
                    _ => registry.register::<Health>(),
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Then - Every thread got the id the type chose for itself
        for (i, id) in results.into_iter().enumerate() {
            assert_eq!(id.index(), i % 3);
        }
        assert_eq!(registry.len(), 3);
    }
}
