use foundation::ClientId;
use serde::{Deserialize, Serialize};

/// Owning client of one or more sites. Only used for filtering and labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
}

impl Client {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ClientId::new(id),
            name: name.into(),
        }
    }
}
