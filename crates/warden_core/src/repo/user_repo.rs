//! User repository contract and driver-agnostic user composition.
//!
//! # Responsibility
//! - Define user lookups (by email, by role filter) and authentication.
//! - Compose users from their owned name, resolved roles and hashed password
//!   on create and update, for every storage driver.
//!
//! # Invariants
//! - Plaintext passwords are hashed before they reach any entity.
//! - A user's role set is deduplicated and sorted by role name.
//! - Unknown role names fail with `RepoError::UnknownRole`.

use crate::model::name::{Name, NameUpdate};
use crate::model::new_uid;
use crate::model::role::{normalize_role_name, Role};
use crate::model::user::{User, UserCreate, UserUpdate};
use crate::repo::name_repo::NameRepository;
use crate::repo::role_repo::RoleRepository;
use crate::repo::{merge_fields, FieldMap, RepoError, RepoResult, Repository};
use crate::security::PasswordHasher;
use serde_json::Value;
use std::collections::BTreeMap;

const PASSWORD_FIELD: &str = "password";
const HASHED_PASSWORD_FIELD: &str = "hashed_password";
const NAME_FIELD: &str = "name";
const ROLES_FIELD: &str = "roles";

/// Role-set query for [`UserRepository::get_by_role`].
///
/// Matching is case-insensitive. `All` requires every listed role, `Any`
/// takes the union of its nested filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleFilter {
    Name(String),
    All(Vec<String>),
    Any(Vec<RoleFilter>),
}

impl RoleFilter {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn all<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::All(names.into_iter().map(Into::into).collect())
    }

    pub fn any(filters: impl IntoIterator<Item = RoleFilter>) -> Self {
        Self::Any(filters.into_iter().collect())
    }

    /// Flattens the filter into OR-ed groups of AND-ed lowercase role names.
    ///
    /// An empty group matches every user; no groups match nobody.
    pub fn groups(&self) -> Vec<Vec<String>> {
        let mut groups = match self {
            Self::Name(name) => vec![vec![normalize_role_name(name)]],
            Self::All(names) => {
                let mut group: Vec<String> =
                    names.iter().map(|name| normalize_role_name(name)).collect();
                group.sort();
                group.dedup();
                vec![group]
            }
            Self::Any(filters) => filters.iter().flat_map(RoleFilter::groups).collect(),
        };
        groups.sort();
        groups.dedup();
        groups
    }

    pub fn matches(&self, user: &User) -> bool {
        self.groups()
            .iter()
            .any(|group| group.iter().all(|role| user.has_role(role)))
    }
}

impl From<&str> for RoleFilter {
    fn from(value: &str) -> Self {
        Self::name(value)
    }
}

/// Applies an optional filter the way `get_by_role` does: `None` admits
/// only users without roles.
pub fn role_filter_admits(filter: Option<&RoleFilter>, user: &User) -> bool {
    match filter {
        Some(filter) => filter.matches(user),
        None => user.roles.is_empty(),
    }
}

/// User lookups layered on the generic repository.
pub trait UserRepository: Repository<Entity = User, Create = UserCreate, Update = UserUpdate> {
    /// Case-sensitive exact match on the email.
    fn get_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Users matching `filter`, ordered like `get_multi`.
    fn get_by_role(
        &self,
        filter: Option<&RoleFilter>,
        skip: usize,
        limit: Option<usize>,
    ) -> RepoResult<Vec<User>>;

    fn password_hasher(&self) -> &dyn PasswordHasher;

    /// Returns the user when `password` matches the stored hash.
    ///
    /// Inactive users are returned as well; callers check `is_active`.
    fn authenticate(&self, email: &str, password: &str) -> RepoResult<Option<User>> {
        let Some(user) = self.get_by_email(email)? else {
            return Ok(None);
        };
        if self
            .password_hasher()
            .verify(password, &user.hashed_password)?
        {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

/// Builds and merges users through the name and role repositories of the
/// same unit of work.
pub struct UserComposer<'a> {
    names: &'a dyn NameRepository,
    roles: &'a dyn RoleRepository,
    hasher: &'a dyn PasswordHasher,
}

impl<'a> UserComposer<'a> {
    pub fn new(
        names: &'a dyn NameRepository,
        roles: &'a dyn RoleRepository,
        hasher: &'a dyn PasswordHasher,
    ) -> Self {
        Self {
            names,
            roles,
            hasher,
        }
    }

    /// Builds an unsaved user. The owned name, when given, is persisted
    /// immediately so the user can reference it.
    pub fn make_user(&self, payload: UserCreate) -> RepoResult<User> {
        let roles = self.resolve_roles(&payload.roles)?;
        let hashed_password = self.hasher.hash(&payload.password)?;
        let name = match payload.name {
            Some(name) => Some(self.names.create(name)?),
            None => None,
        };

        Ok(User {
            uid: new_uid(),
            email: payload.email,
            hashed_password,
            is_active: payload.is_active,
            is_superuser: payload.is_superuser,
            is_admin: payload.is_admin,
            name,
            roles,
        })
    }

    /// Merges a raw user field map, handling `password`, `name` and `roles`.
    pub fn merge_user(&self, user: User, mut data: FieldMap) -> RepoResult<User> {
        if let Some(password) = data.remove(PASSWORD_FIELD) {
            let Value::String(plaintext) = password else {
                return Err(RepoError::Validation("password must be a string".to_string()));
            };
            data.insert(
                HASHED_PASSWORD_FIELD.to_string(),
                Value::String(self.hasher.hash(&plaintext)?),
            );
        } else {
            data.remove(HASHED_PASSWORD_FIELD);
        }

        if let Some(roles) = data.remove(ROLES_FIELD) {
            let names: Vec<String> = match roles {
                Value::Null => Vec::new(),
                other => serde_json::from_value(other).map_err(|err| {
                    RepoError::Validation(format!("roles must be a list of names: {err}"))
                })?,
            };
            let resolved = self.resolve_roles(&names)?;
            data.insert(ROLES_FIELD.to_string(), serde_json::to_value(resolved)?);
        }

        if let Some(name) = data.remove(NAME_FIELD) {
            let merged = self.merge_name(user.name.clone(), name)?;
            data.insert(NAME_FIELD.to_string(), merged);
        }

        merge_fields(user, &data)
    }

    /// Applies a name sub-payload. The stored name is re-read first, so a
    /// name removed since `user` was loaded is treated as absent.
    fn merge_name(&self, current: Option<Name>, incoming: Value) -> RepoResult<Value> {
        let current = match current {
            Some(existing) => self.names.get(existing.uid)?,
            None => None,
        };
        match (incoming, current) {
            (Value::Null, Some(existing)) => {
                self.names.remove(existing.uid)?;
                Ok(Value::Null)
            }
            (Value::Null, None) => Ok(Value::Null),
            (Value::Object(fields), Some(existing)) => {
                let updated = self.names.update_fields(existing, fields)?;
                Ok(serde_json::to_value(updated)?)
            }
            (Value::Object(fields), None) => {
                let update: NameUpdate =
                    serde_json::from_value(Value::Object(fields)).map_err(|err| {
                        RepoError::Validation(format!("invalid name payload: {err}"))
                    })?;
                let create = update.into_create().ok_or_else(|| {
                    RepoError::Validation("a new name requires `first` and `last`".to_string())
                })?;
                Ok(serde_json::to_value(self.names.create(create)?)?)
            }
            (other, _) => Err(RepoError::Validation(format!(
                "name must be an object or null, got `{other}`"
            ))),
        }
    }

    /// Resolves role names to stored roles, deduplicated and sorted by name.
    pub fn resolve_roles(&self, names: &[String]) -> RepoResult<Vec<Role>> {
        let mut resolved = BTreeMap::new();
        for name in names {
            let role = self
                .roles
                .get_by_name(name)?
                .ok_or_else(|| RepoError::UnknownRole(name.clone()))?;
            resolved.insert(role.name.clone(), role);
        }
        Ok(resolved.into_values().collect())
    }
}
