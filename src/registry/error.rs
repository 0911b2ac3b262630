//! Registry error types

use crate::session::ClientId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A client with this id is registered and still ACTIVE
    #[error("client {0} is already registered and active")]
    AlreadyRegisteredActive(ClientId),

    /// Re-registration under an existing id with a different name
    #[error("client {id} is registered as {registered:?}, not {requested:?}")]
    NameMismatch {
        id: ClientId,
        registered: String,
        requested: String,
    },

    /// No client with this id
    #[error("unknown client: {0}")]
    UnknownClient(ClientId),
}
