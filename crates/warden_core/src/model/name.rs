//! Personal name entity.
//!
//! A `Name` is owned by at most one `User` and has no lifecycle of its own
//! beyond that owner.

use crate::model::{deserialize_present, Entity, Uid};
use serde::{Deserialize, Serialize};

/// Persisted personal name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub uid: Uid,
    pub title: Option<String>,
    pub first: String,
    pub middle: Option<String>,
    pub last: String,
    pub suffix: Option<String>,
    pub preferred: Option<String>,
}

impl Entity for Name {
    const ENTITY: &'static str = "Name";

    fn uid(&self) -> Uid {
        self.uid
    }
}

/// Payload for creating a `Name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCreate {
    #[serde(default)]
    pub title: Option<String>,
    pub first: String,
    #[serde(default)]
    pub middle: Option<String>,
    pub last: String,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub preferred: Option<String>,
}

impl NameCreate {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            last: last.into(),
            ..Self::default()
        }
    }
}

/// Partial update for a `Name`.
///
/// Outer `None` means "leave unchanged"; for nullable fields `Some(None)`
/// clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameUpdate {
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub middle: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub suffix: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub preferred: Option<Option<String>>,
}

impl NameUpdate {
    /// Converts this partial update into a creation payload.
    ///
    /// Returns `None` when `first` or `last` is missing.
    pub fn into_create(self) -> Option<NameCreate> {
        Some(NameCreate {
            title: self.title.flatten(),
            first: self.first?,
            middle: self.middle.flatten(),
            last: self.last?,
            suffix: self.suffix.flatten(),
            preferred: self.preferred.flatten(),
        })
    }
}
