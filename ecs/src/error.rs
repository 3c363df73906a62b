//! Error values for the storage engine.
//!
//! Every failure the engine can report is a variant of [`Error`]. The variants fall into two
//! groups:
//!
//! - **Programmer errors** (missing registration, duplicate types in a bundle or query, reading a
//!   component an entity does not have, using a deleted entity). The panicking entry points trap
//!   with the variant's `Display` text; the `try_*` entry points hand the same variant back.
//! - **Recoverable errors** (allocation failure, I/O, malformed persisted streams). These are
//!   always returned as values and never leave a [`Storage`](crate::storage::Storage) in a
//!   half-updated state.
//!
//! [`Error::is_recoverable`] tells the two groups apart.

use std::io;

use thiserror::Error;

use crate::{component::ComponentId, entity::Entity};

/// Convenience result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A component id was used before a descriptor was registered for it.
    #[error("component {0} is not registered")]
    NotRegistered(ComponentId),

    /// Two registrations targeted the same component id.
    #[error("component {id} is already registered to `{existing}`, cannot register `{requested}`")]
    AlreadyRegistered {
        id: ComponentId,
        existing: &'static str,
        requested: &'static str,
    },

    /// A bundle, query or persisted record named the same component twice.
    #[error("component {0} appears more than once in the same bundle or query")]
    DuplicateComponent(ComponentId),

    /// The entity is live but does not own the requested component.
    #[error("{entity} does not have component {component}")]
    ComponentNotPresent {
        entity: Entity,
        component: ComponentId,
    },

    /// The entity has been deleted; its handle is a tombstone.
    #[error("{0} has been deleted")]
    EntityDeleted(Entity),

    /// The entity handle was never issued by this storage.
    #[error("{0} was not issued by this storage")]
    UnknownEntity(Entity),

    /// A component type was asked to copy itself but was registered without a copy callback.
    #[error("component {0} does not support copy construction")]
    NotCloneable(ComponentId),

    /// A component type was asked to (de)serialise itself but has no persistence callbacks.
    #[error("component {0} does not support persistence")]
    NotPersistable(ComponentId),

    /// Growing an archetype buffer failed.
    #[error("failed to allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },

    /// A persisted stream ended in the middle of a record.
    #[error("stream ended in the middle of a record")]
    Truncated,

    /// A persisted stream names a component id with no registration.
    #[error("persisted component id {0} is not registered")]
    UnknownComponent(u8),

    /// A component deserialiser refused the stream version.
    #[error("component {component} cannot read data written with version {version}")]
    VersionMismatch { component: ComponentId, version: u32 },

    /// A persisted stream is structurally invalid.
    #[error("invalid stream: {reason}")]
    InvalidStream { reason: &'static str },

    /// A component payload could not be decoded.
    #[error("invalid component payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Determine if this error is one a caller is expected to handle, rather than a programmer
    /// error that should trap.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotCloneable(_)
                | Error::NotPersistable(_)
                | Error::OutOfMemory { .. }
                | Error::Truncated
                | Error::UnknownComponent(_)
                | Error::VersionMismatch { .. }
                | Error::InvalidStream { .. }
                | Error::InvalidPayload(_)
                | Error::Io(_)
        )
    }

    /// Pass recoverable errors through and trap on programmer errors.
    #[track_caller]
    pub(crate) fn surface(self) -> Self {
        if self.is_recoverable() {
            self
        } else {
            panic!("{self}")
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        match *error {
            bincode::ErrorKind::Io(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                Error::Truncated
            }
            bincode::ErrorKind::Io(error) => Error::Io(error),
            other => Error::InvalidPayload(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmer_errors_are_not_recoverable() {
        // Given
        let errors = [
            Error::NotRegistered(ComponentId::new(1)),
            Error::DuplicateComponent(ComponentId::new(2)),
            Error::EntityDeleted(Entity::new(3)),
            Error::ComponentNotPresent {
                entity: Entity::new(0),
                component: ComponentId::new(4),
            },
        ];

        // Then
        assert!(errors.iter().all(|e| !e.is_recoverable()));
    }

    #[test]
    fn io_and_allocation_errors_are_recoverable() {
        assert!(Error::Truncated.is_recoverable());
        assert!(Error::OutOfMemory { bytes: 64 }.is_recoverable());
        assert!(Error::UnknownComponent(9).is_recoverable());
        assert!(Error::from(io::Error::other("disk on fire")).is_recoverable());
    }

    #[test]
    fn bincode_errors_map_onto_stream_errors() {
        // Given
        let eof = Box::new(bincode::ErrorKind::Io(io::ErrorKind::UnexpectedEof.into()));
        let bad_bool = Box::new(bincode::ErrorKind::InvalidBoolEncoding(7));

        // Then
        assert!(matches!(Error::from(eof), Error::Truncated));
        assert!(matches!(Error::from(bad_bool), Error::InvalidPayload(_)));
    }

    #[test]
    fn display_names_the_offenders() {
        // Given
        let error = Error::ComponentNotPresent {
            entity: Entity::new(7),
            component: ComponentId::new(12),
        };

        // Then
        assert_eq!(error.to_string(), "entity 7 does not have component 12");
    }

    #[test]
    #[should_panic(expected = "entity 5 has been deleted")]
    fn surface_traps_programmer_errors() {
        let _ = Error::EntityDeleted(Entity::new(5)).surface();
    }
}
