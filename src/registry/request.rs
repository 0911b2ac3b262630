//! Registration requests

use serde::{Deserialize, Serialize};

use crate::session::ClientId;

/// Client registration request as received from the service layer
///
/// Without an id the registry generates one. With an id, the request is a
/// re-registration of that client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ClientId>,
    pub name: String,
}

impl ClientSpec {
    /// Request for a new client
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Re-register under an existing id
    pub fn with_id(mut self, id: ClientId) -> Self {
        self.id = Some(id);
        self
    }
}
