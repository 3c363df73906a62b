//! Binary persistence of a whole storage.
//!
//! The stream is a sequence of little-endian scalars:
//!
//! ```text
//! archetype_count : u64
//! per archetype (non-empty, every component persistable):
//!   entity_count    : u64
//!   component_count : u64
//!   component_id    : u8    × component_count, in layout order
//!   payload         : ...   × entity_count × component_count, same order
//! ```
//!
//! Payloads are each component's serde representation under bincode's default encoding
//! (little-endian fixed-width integers, `u64` lengths). The stream records the order components
//! were written in, not their offsets, so a reader whose layout planner places components
//! differently still reads it correctly.
//!
//! Entity ids are not stored; the reader hands out fresh ones.

mod codec;
mod stream;

pub use codec::{read, write};
pub use stream::{Decoder, Encoder};
