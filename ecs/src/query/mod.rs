//! Query dispatch: projecting a typed parameter list onto archetype rows.
//!
//! A query is a tuple of parameters, each either [`Entity`] or a reference (`&C` / `&mut C`) to
//! a component. [`Storage::foreach`](crate::storage::Storage::foreach) builds the required
//! component set from the parameters, visits every archetype whose set contains it, and for each
//! archetype computes the byte offset of every parameter once. The inner loop then only adds
//! offsets to the row pointer of each slot.
//!
//! ```ignore
//! storage.foreach::<(Entity, &Position, &mut Velocity)>(|(entity, pos, vel)| {
//!     vel.dx -= pos.x * 0.1;
//! });
//! ```
//!
//! A component type may appear at most once in a query, which is what makes handing out
//! `&mut` references to several columns of the same row sound.

use std::{any::TypeId, ptr::NonNull};

use crate::{
    all_tuples,
    archetype::RowLayout,
    component::{Component, ComponentSet},
    entity::Entity,
    error::{Error, Result},
};

/// Offset reported for parameters that do not read a component column.
pub const NO_COLUMN: usize = usize::MAX;

/// One parameter of a query.
pub trait Param {
    /// The value handed to the callback for one row.
    type Item<'w>;

    /// True for the [`Entity`] parameter.
    const ENTITY: bool = false;

    /// Add the component id this parameter reads, if any.
    fn insert_ids(set: &mut ComponentSet) -> Result<()>;

    /// Resolve this parameter's byte offset within a row of `layout`.
    fn offset(layout: &RowLayout) -> usize;

    /// Produce the item for one row.
    ///
    /// # Safety
    /// `row` must point at a live row of the layout `offset` was computed from, and no other
    /// reference to the same column of that row may be live for `'w`.
    unsafe fn fetch<'w>(entity: Entity, row: NonNull<u8>, offset: usize) -> Self::Item<'w>;
}

impl Param for Entity {
    type Item<'w> = Entity;

    const ENTITY: bool = true;

    fn insert_ids(_set: &mut ComponentSet) -> Result<()> {
        Ok(())
    }

    fn offset(_layout: &RowLayout) -> usize {
        NO_COLUMN
    }

    #[inline]
    unsafe fn fetch<'w>(entity: Entity, _row: NonNull<u8>, _offset: usize) -> Self::Item<'w> {
        entity
    }
}

impl<C: Component> Param for &C {
    type Item<'w> = &'w C;

    fn insert_ids(set: &mut ComponentSet) -> Result<()> {
        insert_unique::<C>(set)
    }

    fn offset(layout: &RowLayout) -> usize {
        column_offset::<C>(layout)
    }

    #[inline]
    unsafe fn fetch<'w>(_entity: Entity, row: NonNull<u8>, offset: usize) -> Self::Item<'w> {
        unsafe { row.add(offset).cast::<C>().as_ref() }
    }
}

impl<C: Component> Param for &mut C {
    type Item<'w> = &'w mut C;

    fn insert_ids(set: &mut ComponentSet) -> Result<()> {
        insert_unique::<C>(set)
    }

    fn offset(layout: &RowLayout) -> usize {
        column_offset::<C>(layout)
    }

    #[inline]
    unsafe fn fetch<'w>(_entity: Entity, row: NonNull<u8>, offset: usize) -> Self::Item<'w> {
        unsafe { row.add(offset).cast::<C>().as_mut() }
    }
}

fn insert_unique<C: Component>(set: &mut ComponentSet) -> Result<()> {
    if set.insert(C::ID) {
        Ok(())
    } else {
        Err(Error::DuplicateComponent(C::ID))
    }
}

#[track_caller]
fn column_offset<C: Component>(layout: &RowLayout) -> usize {
    let Some(column) = layout.column(C::ID) else {
        panic!("query matched an archetype without component {}", C::ID);
    };
    assert!(
        column.info().type_id() == TypeId::of::<C>(),
        "component {} is registered to `{}`, not `{}`",
        C::ID,
        column.info().name(),
        std::any::type_name::<C>()
    );
    column.offset()
}

/// A full query: a single [`Param`] or a tuple of them.
pub trait Query {
    type Item<'w>;

    /// Add the component ids the query reads. Repeats are [`Error::DuplicateComponent`].
    fn insert_ids(set: &mut ComponentSet) -> Result<()>;

    /// Get the set of components an archetype must contain to match.
    fn component_set() -> Result<ComponentSet> {
        let mut set = ComponentSet::new();
        Self::insert_ids(&mut set)?;
        Ok(set)
    }

    /// True if every parameter is the entity handle.
    fn only_entity() -> bool;

    /// The number of parameters.
    fn arity() -> usize;

    /// Append one offset per parameter, in parameter order.
    fn offsets(layout: &RowLayout, out: &mut Vec<usize>);

    /// Produce the items for one row.
    ///
    /// # Safety
    /// `offsets` must come from [`offsets`](Self::offsets) for the layout of the archetype `row`
    /// belongs to, and `row` must be live. See [`Param::fetch`].
    unsafe fn fetch<'w>(entity: Entity, row: NonNull<u8>, offsets: &[usize]) -> Self::Item<'w>;
}

impl<P: Param> Query for P {
    type Item<'w> = <P as Param>::Item<'w>;

    fn insert_ids(set: &mut ComponentSet) -> Result<()> {
        <P as Param>::insert_ids(set)
    }

    fn only_entity() -> bool {
        P::ENTITY
    }

    fn arity() -> usize {
        1
    }

    fn offsets(layout: &RowLayout, out: &mut Vec<usize>) {
        out.push(P::offset(layout));
    }

    #[inline]
    unsafe fn fetch<'w>(entity: Entity, row: NonNull<u8>, offsets: &[usize]) -> Self::Item<'w> {
        unsafe { <P as Param>::fetch(entity, row, offsets[0]) }
    }
}

macro_rules! tuple_query {
    ($($name: ident),*) => {
        impl<$($name: Param),*> Query for ($($name,)*) {
            type Item<'w> = ($(<$name as Param>::Item<'w>,)*);

            fn insert_ids(set: &mut ComponentSet) -> Result<()> {
                $(<$name as Param>::insert_ids(set)?;)*
                Ok(())
            }

            fn only_entity() -> bool {
                $(<$name as Param>::ENTITY &&)* true
            }

            fn arity() -> usize {
                [$(stringify!($name)),*].len()
            }

            fn offsets(layout: &RowLayout, out: &mut Vec<usize>) {
                $(out.push(<$name as Param>::offset(layout));)*
            }

            #[inline]
            unsafe fn fetch<'w>(
                entity: Entity,
                row: NonNull<u8>,
                offsets: &[usize],
            ) -> Self::Item<'w> {
                #[allow(non_snake_case)]
                let &[$($name),*] = offsets else {
                    unreachable!("query offsets do not match its arity");
                };
                ($(unsafe { <$name as Param>::fetch(entity, row, $name) },)*)
            }
        }
    }
}

all_tuples!(tuple_query);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Component, component::ComponentId};

    #[derive(Component, Debug, PartialEq)]
    #[component(id = 0)]
    struct Position(f32, f32);

    #[derive(Component, Debug, PartialEq)]
    #[component(id = 1)]
    struct Velocity(f64);

    #[derive(Component, Debug, PartialEq)]
    #[component(id = 2)]
    struct Health(u16);

    #[test]
    fn required_set_skips_entity() {
        // When
        let set = <(Entity, &Position, &mut Velocity)>::component_set().unwrap();

        // Then
        assert_eq!(set, ComponentSet::from_ids([0, 1].map(ComponentId::new)));
        assert!(!<(Entity, &Position)>::only_entity());
        assert!(<(Entity,)>::only_entity());
        assert!(<Entity>::only_entity());
    }

    #[test]
    fn repeated_components_are_reported() {
        // When
        let result = <(&Position, Entity, &mut Position)>::component_set();

        // Then
        assert!(matches!(result, Err(Error::DuplicateComponent(id)) if id == Position::ID));
    }

    #[test]
    fn offsets_follow_parameter_order() {
        // Given
        let layout = RowLayout::plan(&[Position::info(), Velocity::info(), Health::info()]);
        let mut offsets = Vec::new();

        // When
        <(&Health, Entity, &Velocity)>::offsets(&layout, &mut offsets);

        // Then
        assert_eq!(
            offsets,
            vec![
                layout.offset_of(Health::ID).unwrap(),
                NO_COLUMN,
                layout.offset_of(Velocity::ID).unwrap()
            ]
        );
    }

    #[test]
    fn fetch_reads_the_row() {
        // Given
        #[repr(C)]
        struct Row {
            velocity: Velocity,
            position: Position,
        }
        let layout = RowLayout::plan(&[Position::info(), Velocity::info()]);
        assert_eq!(layout.offset_of(Velocity::ID), Some(0));
        assert_eq!(layout.offset_of(Position::ID), Some(8));
        let mut row = Row {
            velocity: Velocity(2.0),
            position: Position(1.0, 3.0),
        };
        let mut offsets = Vec::new();
        <(Entity, &Position, &mut Velocity)>::offsets(&layout, &mut offsets);

        // When
        let ptr = NonNull::from(&mut row).cast::<u8>();
        let (entity, position, velocity) =
            unsafe { <(Entity, &Position, &mut Velocity)>::fetch(Entity::new(3), ptr, &offsets) };
        velocity.0 += position.0 as f64;

        // Then
        assert_eq!(entity, Entity::new(3));
        assert_eq!(row.velocity, Velocity(3.0));
    }
}
