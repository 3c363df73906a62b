use crate::{
    all_tuples,
    component::{Component, ComponentSet},
    entity::Entity,
    error::{Error, Result},
};

/// Trait describing a target that component values can be written to, one value at a time.
///
/// The archetype store implements this for a freshly reserved row so a [`Bundle`] can place each
/// of its values at the right offset without the store knowing the concrete tuple type.
pub trait Target {
    fn write<C: Component>(&mut self, value: C);
}

/// A typed pack of component values owned by a new entity.
///
/// Bundles are a single component or a (possibly nested) tuple of components. Every component type
/// may appear at most once; a repeat is reported as [`Error::DuplicateComponent`].
pub trait Bundle: 'static {
    /// Add the ids of this bundle's components to `set`.
    fn insert_ids(set: &mut ComponentSet) -> Result<()>;

    /// Get the set of component ids in this bundle.
    fn component_set() -> Result<ComponentSet> {
        let mut set = ComponentSet::new();
        Self::insert_ids(&mut set)?;
        Ok(set)
    }

    /// Write each value in the bundle to the target. This takes ownership of self.
    fn write<T: Target>(self, target: &mut T);
}

impl<C: Component> Bundle for C {
    fn insert_ids(set: &mut ComponentSet) -> Result<()> {
        if set.insert(C::ID) {
            Ok(())
        } else {
            Err(Error::DuplicateComponent(C::ID))
        }
    }

    fn write<T: Target>(self, target: &mut T) {
        target.write(self);
    }
}

macro_rules! tuple_bundle {
    ($($name: ident),*) => {
        impl<$($name: Bundle),*> Bundle for ($($name,)*) {
            fn insert_ids(set: &mut ComponentSet) -> Result<()> {
                $(<$name as Bundle>::insert_ids(set)?;)*
                Ok(())
            }

            fn write<CT: Target>(self, target: &mut CT) {
                #[allow(non_snake_case)]
                let ( $($name,)* ) = self;
                $(<$name as Bundle>::write($name, target);)*
            }
        }
    }
}

all_tuples!(tuple_bundle);

/// A typed list of component types used to name a component set, e.g. for
/// [`Storage::has_components`](crate::storage::Storage::has_components).
///
/// [`Entity`] may appear in the list and contributes nothing to the set, so lists can mirror a
/// query's parameters.
pub trait TypeList {
    /// Add the ids of the listed component types to `set`.
    fn insert_ids(set: &mut ComponentSet) -> Result<()>;

    /// Get the set of component ids named by this list.
    fn component_set() -> Result<ComponentSet> {
        let mut set = ComponentSet::new();
        Self::insert_ids(&mut set)?;
        Ok(set)
    }
}

impl<C: Component> TypeList for C {
    fn insert_ids(set: &mut ComponentSet) -> Result<()> {
        if set.insert(C::ID) {
            Ok(())
        } else {
            Err(Error::DuplicateComponent(C::ID))
        }
    }
}

impl TypeList for Entity {
    fn insert_ids(_set: &mut ComponentSet) -> Result<()> {
        Ok(())
    }
}

macro_rules! tuple_type_list {
    ($($name: ident),*) => {
        impl<$($name: TypeList),*> TypeList for ($($name,)*) {
            fn insert_ids(set: &mut ComponentSet) -> Result<()> {
                $(<$name as TypeList>::insert_ids(set)?;)*
                Ok(())
            }
        }
    }
}

all_tuples!(tuple_type_list);
