//! Role entity.

use crate::model::{deserialize_present, Entity, Uid};
use serde::{Deserialize, Serialize};

/// Named permission group. Names are unique and case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub uid: Uid,
    /// Stored lowercase.
    pub name: String,
    pub description: Option<String>,
}

impl Entity for Role {
    const ENTITY: &'static str = "Role";

    fn uid(&self) -> Uid {
        self.uid
    }
}

/// Payload for creating a `Role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl RoleCreate {
    pub fn new(name: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
        }
    }
}

/// Partial update for a `Role`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
}

/// Normalizes a role name for storage and comparison.
pub fn normalize_role_name(name: &str) -> String {
    name.trim().to_lowercase()
}
