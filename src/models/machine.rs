use serde::{Deserialize, Serialize};

/// Persisted machine identity.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Machine {
    pub id: String,
    pub name: String,
}

impl Machine {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}
