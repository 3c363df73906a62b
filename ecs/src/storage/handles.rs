use crate::{
    archetype::ArchetypeId,
    entity::Entity,
    error::{Error, Result},
};

/// Where a live entity is stored: an archetype and a slot inside it.
///
/// Slots move whenever rows are erased or migrated; the handle table is updated in the same
/// operation so a location read from it is always current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    archetype: ArchetypeId,
    slot: usize,
}

impl Location {
    #[inline]
    pub const fn new(archetype: ArchetypeId, slot: usize) -> Self {
        Self { archetype, slot }
    }

    /// Get the archetype the entity is stored in.
    #[inline]
    pub fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// Get the slot the entity occupies in its archetype.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// The handle table: entity id to location, or a tombstone for deleted entities.
///
/// Ids are issued from the length of the table, so they increase monotonically and are never
/// reused.
#[derive(Debug, Clone, Default)]
pub(crate) struct Handles {
    locations: Vec<Option<Location>>,
}

impl Handles {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity the next call to [`push`](Self::push) will issue.
    ///
    /// # Panics
    /// Panics once every `u32` id has been issued.
    #[inline]
    #[track_caller]
    pub fn next(&self) -> Entity {
        entity_at(self.locations.len())
    }

    /// Issue a new entity stored at `location`.
    #[inline]
    pub fn push(&mut self, location: Location) -> Entity {
        let entity = self.next();
        self.locations.push(Some(location));
        entity
    }

    /// Look up a live entity.
    #[inline]
    pub fn get(&self, entity: Entity) -> Result<Location> {
        match self.locations.get(entity.index()) {
            Some(Some(location)) => Ok(*location),
            Some(None) => Err(Error::EntityDeleted(entity)),
            None => Err(Error::UnknownEntity(entity)),
        }
    }

    /// Point a live entity at a new location.
    #[inline]
    pub fn set(&mut self, entity: Entity, location: Location) {
        debug_assert!(self.is_alive(entity), "{entity} is not alive");
        self.locations[entity.index()] = Some(location);
    }

    /// Mark an entity deleted. Its id stays reserved.
    #[inline]
    pub fn tombstone(&mut self, entity: Entity) {
        self.locations[entity.index()] = None;
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        matches!(self.locations.get(entity.index()), Some(Some(_)))
    }

    /// Number of ids ever issued, live or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Iterate every live entity and its location, in id order.
    pub fn live(&self) -> impl Iterator<Item = (Entity, Location)> + '_ {
        self.locations
            .iter()
            .enumerate()
            .filter_map(|(id, location)| location.map(|l| (entity_at(id), l)))
    }

    /// Tombstone every entity.
    pub fn clear(&mut self) {
        self.locations.fill(None);
    }
}

/// The entity owning table entry `index`.
#[track_caller]
fn entity_at(index: usize) -> Entity {
    match u32::try_from(index) {
        Ok(id) => Entity::new(id),
        Err(_) => panic!("entity ids exhausted after {index} entities"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        // Given
        let mut handles = Handles::new();
        let location = Location::new(ArchetypeId::new(0), 0);

        // When
        let first = handles.push(location);
        let second = handles.push(location);
        handles.tombstone(first);
        let third = handles.push(location);

        // Then
        assert_eq!([first.id(), second.id(), third.id()], [0, 1, 2]);
        assert!(!handles.is_alive(first));
        assert!(matches!(handles.get(first), Err(Error::EntityDeleted(e)) if e == first));
        assert!(matches!(
            handles.get(Entity::new(9)),
            Err(Error::UnknownEntity(_))
        ));
        assert_eq!(handles.live().count(), 2);
    }

    #[test]
    fn set_moves_a_live_entity() {
        // Given
        let mut handles = Handles::new();
        let entity = handles.push(Location::new(ArchetypeId::new(0), 3));

        // When
        handles.set(entity, Location::new(ArchetypeId::new(1), 0));

        // Then
        assert_eq!(
            handles.get(entity).unwrap(),
            Location::new(ArchetypeId::new(1), 0)
        );
    }

    #[test]
    fn the_last_u32_is_still_an_id() {
        assert_eq!(entity_at(u32::MAX as usize).id(), u32::MAX);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[should_panic(expected = "entity ids exhausted")]
    fn ids_past_the_u32_range_trap() {
        let _ = entity_at(u32::MAX as usize + 1);
    }
}
