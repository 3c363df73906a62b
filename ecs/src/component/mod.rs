//! Component types and their runtime descriptions.
//!
//! Components are plain Rust values attached to entities. Each component type picks a fixed
//! [`ComponentId`] in `0..MAX_COMPONENTS` through the [`Component`] trait, and registers a
//! descriptor ([`Info`]) with a shared [`Registry`] before any storage touches it.
//!
//! ## Architecture
//!
//! - [`Component`]: The trait every component type implements (usually via the derive)
//! - [`ComponentId`]: The fixed identifier a type chooses for itself
//! - [`Info`]: Type-erased lifecycle and persistence callbacks for one component type
//! - [`Registry`]: Thread-safe table of descriptors, shared between storages
//! - [`ComponentSet`]: Fixed-width bitset naming a set of component ids
//! - [`Bundle`]: A typed pack of component values used to create entities
//! - [`TypeList`]: A typed list of component types (and optionally [`Entity`](crate::entity::Entity)) used to name sets
//!
//! ## Usage
//!
//! ```ignore
//! use rusty_ecs::{Component, component::Registry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Component, Clone, Serialize, Deserialize)]
//! #[component(id = 0, clone, persist)]
//! struct Position { x: f32, y: f32 }
//!
//! let registry = Registry::new();
//! let id = registry.register::<Position>();
//! ```

use std::fmt;

mod bundle;
mod info;
mod registry;
mod set;

pub use bundle::{Bundle, Target, TypeList};
pub use info::Info;
pub use registry::Registry;
pub use set::ComponentSet;

/// The number of distinct component ids a registry can hold.
pub const MAX_COMPONENTS: usize = 256;

/// A component identifier, chosen by the component type itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u8);

impl ComponentId {
    /// Construct a component id from its raw value.
    #[inline]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Get the raw value of this id, as written to persisted streams.
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    /// Get the index of this component if it were to live in indexable storage (e.g. Vec)
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for ComponentId {
    #[inline]
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value type that can be stored in an archetype.
///
/// Implementors choose a unique [`ComponentId`] and describe their lifecycle through [`info`].
/// The default descriptor supports destroy and move only; copying traps at runtime and the type
/// is not persisted. `#[derive(Component)]` with the `clone` or `persist` flags overrides
/// [`info`] to install those callbacks; `persist` needs serde's `Serialize` and `Deserialize`.
///
/// [`info`]: Component::info
pub trait Component: 'static + Sized {
    /// The fixed identifier of this component type.
    const ID: ComponentId;

    /// Build the descriptor registered for this type.
    fn info() -> Info {
        Info::new::<Self>()
    }

    /// Determine if payloads written under the stream `version` can be read back.
    ///
    /// Refused versions fail the load with [`Error::VersionMismatch`](crate::Error::VersionMismatch).
    fn accepts_version(version: u32) -> bool {
        let _ = version;
        true
    }
}

