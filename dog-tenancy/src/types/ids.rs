use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Durable handle of one tier migration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationHandle(pub String);

impl MigrationHandle {
    /// Generate a new unique handle
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MigrationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MigrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MigrationHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for MigrationHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
