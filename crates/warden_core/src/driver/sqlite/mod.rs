//! Built-in SQLite storage driver.
//!
//! # Responsibility
//! - Map Name, Role and User onto the `names`, `roles`, `users` and
//!   `users_roles` tables.
//! - Open one connection per unit of work.
//!
//! # Invariants
//! - Units of work only open databases at the latest schema version;
//!   `setup_storage`/`init_storage` are the only schema writers.
//! - Deleting a name nullifies `users.name_id`; deleting a role removes its
//!   links; deleting a user also deletes its owned name.

use crate::db::{connect, open_db};
use crate::driver::{bind_driver, Driver, DriverError, Storage};
use crate::model::name::Name;
use crate::model::role::Role;
use crate::model::user::User;
use crate::model::ModelDescriptor;
use crate::repo::name_repo::NameRepository;
use crate::repo::role_repo::RoleRepository;
use crate::repo::user_repo::UserRepository;
use crate::repo::{RepoError, RepoResult};
use crate::security::{BcryptHasher, PasswordHasher};
use crate::settings::StorageSettings;
use crate::uow::{RepositoryRegistry, UnitOfWork};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

mod name_repo;
mod role_repo;
mod session;
mod sql;
mod user_repo;

pub use name_repo::SqlNameRepository;
pub use role_repo::SqlRoleRepository;
pub use session::{SqlSession, SqlUnitOfWork};
pub use user_repo::SqlUserRepository;

/// Table names used by the SQLite schema.
pub mod tables {
    pub use super::name_repo::TABLE as NAMES;
    pub use super::role_repo::TABLE as ROLES;
    pub use super::user_repo::{ROLE_LINK_TABLE as USERS_ROLES, TABLE as USERS};
}

/// SQLite driver bound to one database file.
pub struct SqliteDriver {
    path: PathBuf,
    hasher: Arc<dyn PasswordHasher>,
}

impl SqliteDriver {
    pub const NAME: &'static str = "sqlite";

    pub fn new(path: impl Into<PathBuf>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            path: path.into(),
            hasher,
        }
    }

    /// Driver constructor registered under [`SqliteDriver::NAME`].
    pub fn from_settings(settings: &StorageSettings) -> Result<Arc<dyn Storage>, DriverError> {
        let hasher = BcryptHasher::new(settings.security.bcrypt_cost).map_err(RepoError::from)?;
        bind_driver(
            Self::new(settings.database.path.clone(), Arc::new(hasher)),
            settings.first_admin.clone(),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Driver for SqliteDriver {
    type Context = SqlSession;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn models(&self) -> Vec<ModelDescriptor> {
        vec![
            ModelDescriptor::of::<Name>(),
            ModelDescriptor::of::<Role>(),
            ModelDescriptor::of::<User>(),
        ]
    }

    fn name_repository(context: &Rc<SqlSession>) -> Rc<dyn NameRepository> {
        Rc::new(SqlNameRepository::new(context))
    }

    fn role_repository(context: &Rc<SqlSession>) -> Rc<dyn RoleRepository> {
        Rc::new(SqlRoleRepository::new(context))
    }

    fn user_repository(context: &Rc<SqlSession>) -> Rc<dyn UserRepository> {
        Rc::new(SqlUserRepository::new(context))
    }

    fn create_uow(
        &self,
        registry: &Arc<RepositoryRegistry<SqlSession>>,
    ) -> RepoResult<Box<dyn UnitOfWork>> {
        let connection = connect(&self.path)?;
        Ok(Box::new(SqlUnitOfWork::new(
            connection,
            Arc::clone(registry),
            Arc::clone(&self.hasher),
        )))
    }

    /// Applies pending migrations; a no-op on an up-to-date database.
    fn init_storage(&self) -> RepoResult<()> {
        open_db(&self.path)?;
        Ok(())
    }

    /// Creates the database file, its parent directory and the schema.
    fn setup_storage(&self) -> RepoResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        open_db(&self.path)?;
        Ok(())
    }

    fn storage_ready(&self) -> RepoResult<bool> {
        let connection = connect(&self.path)?;
        let alive: i64 = connection.query_row("SELECT 1;", [], |row| row.get(0))?;
        Ok(alive == 1)
    }
}
