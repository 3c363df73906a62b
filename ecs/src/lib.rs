//! An archetype-based entity-component store.
//!
//! Entities are stable handles; their data lives in [`Archetype`](archetype::Archetype)s, one per
//! unique set of component types, packed row by row. [`Storage`] is the entry point: it creates
//! and deletes entities, migrates them between archetypes as components are added and removed,
//! and dispatches callbacks over every entity matching a query.
//!
//! ```ignore
//! use std::sync::Arc;
//! use rusty_ecs::{Component, Entity, Registry, Storage};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Component, Clone, Serialize, Deserialize)]
//! #[component(id = 0, clone, persist)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component)]
//! #[component(id = 1)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let registry = Arc::new(Registry::new());
//! registry.register::<Position>();
//! registry.register::<Velocity>();
//!
//! let mut storage = Storage::new(registry);
//! let entity = storage.add_entity((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.5 }))?;
//!
//! storage.foreach::<(&mut Position, &Velocity)>(|(pos, vel)| {
//!     pos.x += vel.dx;
//!     pos.y += vel.dy;
//! });
//! assert_eq!(storage.get_component::<Position>(entity).x, 1.0);
//! ```

// Lets derive output name `::rusty_ecs` from inside this crate too.
extern crate self as rusty_ecs;

pub mod archetype;
pub mod component;
pub mod entity;
pub mod error;
pub mod persist;
pub mod query;
pub mod storage;

pub(crate) mod util;

pub use component::{Component, Registry};
pub use entity::Entity;
pub use error::{Error, Result};
pub use storage::{Storage, StorageConfig};

pub use rusty_ecs_macros::Component;
