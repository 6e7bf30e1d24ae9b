//! User account entity.
//!
//! # Invariants
//! - `email` is unique across users and compared case-sensitively.
//! - `hashed_password` only ever holds output of the password hasher.
//! - `roles` holds no duplicate role and is kept sorted by role name.

use crate::model::name::{Name, NameCreate, NameUpdate};
use crate::model::role::Role;
use crate::model::{deserialize_present, Entity, Uid};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

/// Persisted user account with its owned name and assigned roles.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: Uid,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_admin: bool,
    pub name: Option<Name>,
    pub roles: Vec<Role>,
}

impl User {
    /// Returns whether this user holds the role (case-insensitive).
    pub fn has_role(&self, role_name: &str) -> bool {
        self.roles
            .iter()
            .any(|role| role.name.eq_ignore_ascii_case(role_name.trim()))
    }
}

impl Entity for User {
    const ENTITY: &'static str = "User";

    fn uid(&self) -> Uid {
        self.uid
    }
}

impl Debug for User {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("hashed_password", &"<redacted>")
            .field("is_active", &self.is_active)
            .field("is_superuser", &self.is_superuser)
            .field("is_admin", &self.is_admin)
            .field("name", &self.name)
            .field("roles", &self.roles)
            .finish()
    }
}

/// Payload for creating a `User`.
///
/// `password` is plaintext and is replaced by its hash before persistence.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub name: Option<NameCreate>,
    /// Role names resolved against existing roles.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserCreate {
    /// Creates an active, unprivileged user payload.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            is_active: true,
            is_superuser: false,
            is_admin: false,
            name: None,
            roles: Vec::new(),
        }
    }
}

impl Debug for UserCreate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCreate")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("is_active", &self.is_active)
            .field("is_superuser", &self.is_superuser)
            .field("is_admin", &self.is_admin)
            .field("name", &self.name)
            .field("roles", &self.roles)
            .finish()
    }
}

/// Partial update for a `User`.
///
/// - `name` creates the owned name when none exists, merges otherwise.
/// - `roles` replaces the whole role set.
/// - `password` is hashed before it reaches storage.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    /// `Some(None)` detaches and deletes the owned name.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<Option<NameUpdate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl Debug for UserUpdate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserUpdate")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("is_active", &self.is_active)
            .field("is_superuser", &self.is_superuser)
            .field("is_admin", &self.is_admin)
            .field("name", &self.name)
            .field("roles", &self.roles)
            .finish()
    }
}

fn default_true() -> bool {
    true
}
