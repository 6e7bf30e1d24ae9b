//! Repository layer abstractions.
//!
//! # Responsibility
//! - Define the storage-agnostic CRUD contract over one entity type.
//! - Own the shared partial-update merge used by every driver.
//! - Define per-entity lookup extensions (by name, by email, by role).
//!
//! # Invariants
//! - `get` variants signal "not found" with `None`; `remove` and `update`
//!   fail with `RepoError::NotFound`.
//! - A removed entity is never written back; its `uid` is not reused.
//! - A merge only touches fields the payload defines; `uid` is never
//!   overwritten.

use crate::db::DbError;
use crate::model::{Entity, Uid};
use crate::security::PasswordError;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod name_repo;
pub mod role_repo;
pub mod user_repo;

/// Default page size for `get_multi`.
pub const DEFAULT_LIMIT: usize = 100;

const UID_FIELD: &str = "uid";

/// Flat field-to-value mapping used for partial updates.
pub type FieldMap = serde_json::Map<String, Value>;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository and unit-of-work error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, uid: Uid },
    /// A uniqueness constraint rejected the write.
    Conflict(String),
    /// Payload content cannot be applied to the entity.
    Validation(String),
    UnknownRole(String),
    Password(PasswordError),
    Serialization(serde_json::Error),
    InvalidData(String),
    Io(std::io::Error),
    /// The unit of work backing this repository was closed or dropped.
    SessionClosed,
    UnboundRepository(String),
    RepositoryType(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, uid } => write!(f, "no {entity} with uid: {uid}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Validation(message) => write!(f, "invalid payload: {message}"),
            Self::UnknownRole(name) => write!(f, "role not found: {name}"),
            Self::Password(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "entity serialization failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Io(err) => write!(f, "storage io failed: {err}"),
            Self::SessionClosed => write!(f, "unit of work is closed"),
            Self::UnboundRepository(name) => write!(f, "no repository bound as `{name}`"),
            Self::RepositoryType(name) => {
                write!(f, "repository bound as `{name}` has a different type")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Password(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::NotFound { .. }
            | Self::Conflict(_)
            | Self::Validation(_)
            | Self::UnknownRole(_)
            | Self::InvalidData(_)
            | Self::SessionClosed
            | Self::UnboundRepository(_)
            | Self::RepositoryType(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<PasswordError> for RepoError {
    fn from(value: PasswordError) -> Self {
        Self::Password(value)
    }
}

impl From<std::io::Error> for RepoError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Generic CRUD contract over one entity type.
///
/// Drivers supply the storage hooks (`make`, `insert`, `replace`, `load`,
/// `delete`, `get_multi`); the CRUD operations are shared.
pub trait Repository {
    type Entity: Entity;
    type Create;
    type Update: Serialize;

    /// Builds a new, not yet persisted entity from a creation payload.
    fn make(&self, payload: Self::Create) -> RepoResult<Self::Entity>;

    /// Persists an entity built by `make`.
    fn insert(&self, entity: Self::Entity) -> RepoResult<Self::Entity>;

    /// Writes `entity` over its stored row, keyed by `uid`.
    ///
    /// Fails with `RepoError::NotFound` when that row no longer exists.
    fn replace(&self, entity: Self::Entity) -> RepoResult<Self::Entity>;

    fn load(&self, uid: Uid) -> RepoResult<Option<Self::Entity>>;

    /// Deletes `entity` from storage and hands it back.
    fn delete(&self, entity: Self::Entity) -> RepoResult<Self::Entity>;

    /// Lists entities in the backend's default order. `limit: None` is
    /// unbounded; `skip` applies after ordering.
    fn get_multi(&self, skip: usize, limit: Option<usize>) -> RepoResult<Vec<Self::Entity>>;

    /// Applies a field map onto `entity` without persisting it.
    fn merge(&self, entity: Self::Entity, data: FieldMap) -> RepoResult<Self::Entity> {
        merge_fields(entity, &data)
    }

    fn get(&self, uid: Uid) -> RepoResult<Option<Self::Entity>> {
        self.load(uid)
    }

    fn create(&self, payload: Self::Create) -> RepoResult<Self::Entity> {
        let entity = self.make(payload)?;
        self.insert(entity)
    }

    /// Merges the fields present in `payload` onto `entity` and persists it.
    fn update(&self, entity: Self::Entity, payload: Self::Update) -> RepoResult<Self::Entity> {
        let data = payload_fields(&payload)?;
        self.update_fields(entity, data)
    }

    /// Same as [`Repository::update`] for a raw field mapping.
    fn update_fields(&self, entity: Self::Entity, data: FieldMap) -> RepoResult<Self::Entity> {
        let merged = self.merge(entity, data)?;
        self.replace(merged)
    }

    fn remove(&self, uid: Uid) -> RepoResult<Self::Entity> {
        match self.get(uid)? {
            Some(entity) => self.delete(entity),
            None => Err(RepoError::NotFound {
                entity: <Self::Entity as Entity>::ENTITY,
                uid,
            }),
        }
    }
}

/// Flattens a partial payload into the fields it defines.
pub fn payload_fields<P: Serialize + ?Sized>(payload: &P) -> RepoResult<FieldMap> {
    match serde_json::to_value(payload)? {
        Value::Object(fields) => Ok(fields),
        Value::Null => Ok(FieldMap::new()),
        other => Err(RepoError::Validation(format!(
            "update payload must be a field map, got `{other}`"
        ))),
    }
}

/// Overwrites each field of `entity` that `data` also defines.
///
/// Fields of `data` unknown to the entity are ignored, as is `uid`.
pub fn merge_fields<E: Entity>(entity: E, data: &FieldMap) -> RepoResult<E> {
    let mut current = match serde_json::to_value(&entity)? {
        Value::Object(fields) => fields,
        other => {
            return Err(RepoError::InvalidData(format!(
                "{} did not serialize to a field map: `{other}`",
                E::ENTITY
            )))
        }
    };

    for (field, value) in current.iter_mut() {
        if field == UID_FIELD {
            continue;
        }
        if let Some(incoming) = data.get(field) {
            *value = incoming.clone();
        }
    }

    serde_json::from_value(Value::Object(current))
        .map_err(|err| RepoError::Validation(format!("invalid {} update: {err}", E::ENTITY)))
}
