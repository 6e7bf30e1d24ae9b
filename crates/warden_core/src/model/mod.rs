//! Domain entities and their create/update payloads.
//!
//! # Responsibility
//! - Define the persisted shapes (`Name`, `Role`, `User`) shared by every
//!   storage driver.
//! - Define validated payloads used to create or partially update them.
//!
//! # Invariants
//! - Every entity is identified by a stable `Uid`, assigned once at creation
//!   and distinct from any storage-internal primary key.
//! - Update payloads serialize only the fields that are present.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::any::TypeId;
use uuid::Uuid;

pub mod name;
pub mod role;
pub mod user;

/// Externally visible entity identifier.
pub type Uid = Uuid;

/// Shared identity contract for every persisted entity.
pub trait Entity: Serialize + DeserializeOwned + Clone + 'static {
    /// Type name used for attribute and table naming (`"Name"`, `"User"`).
    const ENTITY: &'static str;

    /// Returns the stable external identifier.
    fn uid(&self) -> Uid;
}

/// Runtime descriptor of one entity type declared by a storage driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelDescriptor {
    entity: &'static str,
    type_id: TypeId,
}

impl ModelDescriptor {
    /// Describes the entity type `E`.
    pub fn of<E: Entity>() -> Self {
        Self {
            entity: E::ENTITY,
            type_id: TypeId::of::<E>(),
        }
    }

    /// Entity type name.
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns whether this descriptor describes `E`.
    pub fn is<E: Entity>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }
}

/// Generates a fresh entity identifier.
pub fn new_uid() -> Uid {
    Uuid::new_v4()
}

/// Keeps `Some(None)` for an explicit `null` instead of collapsing it into
/// an absent field.
pub(crate) fn deserialize_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
