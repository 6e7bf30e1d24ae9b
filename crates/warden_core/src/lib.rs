//! Storage core for Warden: users, roles and names behind a driver-agnostic
//! unit of work.
//!
//! Callers load a [`Storage`] once at startup, then open one unit of work per
//! operation and reach repositories through it.

pub mod db;
pub mod driver;
pub mod logging;
pub mod model;
pub mod naming;
pub mod repo;
pub mod security;
pub mod settings;
pub mod uow;

pub use driver::sqlite::{SqlSession, SqlUnitOfWork, SqliteDriver};
pub use driver::{
    bind_driver, default_bindings, load_storage, seed_storage, Driver, DriverError,
    DriverLoader, DriverRegistry, Storage, REQUIRED_ROLES,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::name::{Name, NameCreate, NameUpdate};
pub use model::role::{Role, RoleCreate, RoleUpdate};
pub use model::user::{User, UserCreate, UserUpdate};
pub use model::{new_uid, Entity, ModelDescriptor, Uid};
pub use repo::name_repo::NameRepository;
pub use repo::role_repo::RoleRepository;
pub use repo::user_repo::{RoleFilter, UserRepository};
pub use repo::{FieldMap, RepoError, RepoResult, Repository, DEFAULT_LIMIT};
pub use security::{BcryptHasher, PasswordError, PasswordHasher};
pub use settings::{SettingsError, StorageSettings};
pub use uow::{
    RegistryBuilder, RegistryError, RepositoryKey, RepositoryRegistry, UnitOfWork,
    UnitOfWorkExt,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
