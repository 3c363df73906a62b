//! Component types shared by the benchmarks.
//!
//! Sizes are picked to be representative of real game data.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rusty_ecs::{Component, Registry, Storage};
use serde::{Deserialize, Serialize};

/// 3D position (12 bytes).
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug, Default)]
#[component(id = 0, clone, persist)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 3D velocity (12 bytes).
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug, Default)]
#[component(id = 1, clone, persist)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Rotation as euler angles (12 bytes).
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug, Default)]
#[component(id = 2, clone, persist)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 4x4 transformation matrix (64 bytes).
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug)]
#[component(id = 3, clone, persist)]
pub struct Transform {
    pub matrix: [[f32; 4]; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}

/// Heap-owning component, exercises the destroy and persist callbacks.
#[derive(Component, Serialize, Deserialize, Clone, Debug, Default)]
#[component(id = 4, clone, persist)]
pub struct Tag(pub String);

/// Payload for the fragmentation benchmark.
#[derive(Component, Clone, Copy, Debug, Default)]
#[component(id = 5, clone)]
pub struct Data {
    pub value: f32,
}

macro_rules! markers {
    ($($name:ident = $id:literal),* $(,)?) => {
        $(
            #[derive(Component, Clone, Copy, Debug, Default)]
            #[component(id = $id, clone)]
            pub struct $name;
        )*

        /// Add `Data` plus the `index`th marker, one archetype per marker.
        pub fn add_marked(storage: &mut Storage, index: usize) -> rusty_ecs::Result<rusty_ecs::Entity> {
            match (index % MARKER_COUNT) as u8 + FIRST_MARKER {
                $( $id => storage.add_entity((Data { value: 1.0 }, $name)), )*
                _ => unreachable!("markers cover ids {FIRST_MARKER}..{}", FIRST_MARKER as usize + MARKER_COUNT),
            }
        }

        fn register_markers(registry: &Registry) {
            $( registry.register::<$name>(); )*
        }
    };
}

markers! {
    MarkerA = 10, MarkerB = 11, MarkerC = 12, MarkerD = 13, MarkerE = 14, MarkerF = 15,
    MarkerG = 16, MarkerH = 17, MarkerI = 18, MarkerJ = 19, MarkerK = 20, MarkerL = 21,
    MarkerM = 22, MarkerN = 23, MarkerO = 24, MarkerP = 25, MarkerQ = 26, MarkerR = 27,
    MarkerS = 28, MarkerT = 29, MarkerU = 30, MarkerV = 31, MarkerW = 32, MarkerX = 33,
    MarkerY = 34, MarkerZ = 35,
}

/// Number of distinct marker archetypes `add_marked` spreads entities over.
pub const MARKER_COUNT: usize = 26;

const FIRST_MARKER: u8 = 10;

/// A registry holding every benchmark component.
pub fn registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    registry.register::<Position>();
    registry.register::<Velocity>();
    registry.register::<Rotation>();
    registry.register::<Transform>();
    registry.register::<Tag>();
    registry.register::<Data>();
    register_markers(&registry);
    registry
}

/// Deterministic random moving bodies.
pub fn bodies(n: usize, seed: u64) -> Vec<(Position, Velocity)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            (
                Position {
                    x: rng.gen_range(-100.0..100.0),
                    y: rng.gen_range(-100.0..100.0),
                    z: rng.gen_range(-100.0..100.0),
                },
                Velocity {
                    x: rng.gen_range(-1.0..1.0),
                    y: rng.gen_range(-1.0..1.0),
                    z: rng.gen_range(-1.0..1.0),
                },
            )
        })
        .collect()
}

/// A storage with `n` bodies, a third of them also tagged.
pub fn populated(n: usize, seed: u64) -> Storage {
    let mut storage = Storage::new(registry());
    for (i, (position, velocity)) in bodies(n, seed).into_iter().enumerate() {
        let created = if i % 3 == 0 {
            storage.add_entity((position, velocity, Tag(format!("body {i}"))))
        } else {
            storage.add_entity((position, velocity))
        };
        if let Err(error) = created {
            panic!("benchmark setup failed: {error}");
        }
    }
    storage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_spread_over_separate_archetypes() {
        // Given
        let mut storage = Storage::new(registry());

        // When
        for i in 0..MARKER_COUNT * 2 {
            add_marked(&mut storage, i).unwrap();
        }

        // Then
        assert_eq!(storage.archetype_count(), MARKER_COUNT);
        assert_eq!(storage.count_components::<Data>(), MARKER_COUNT * 2);
    }

    #[test]
    fn populated_is_deterministic() {
        // Given
        let mut first = populated(30, 7);
        let mut second = populated(30, 7);

        // When
        let mut a = Vec::new();
        first.foreach::<&Position>(|p| a.push(p.x));
        let mut b = Vec::new();
        second.foreach::<&Position>(|p| b.push(p.x));

        // Then
        assert_eq!(a, b);
        assert_eq!(first.count_components::<Tag>(), 10);
    }
}
