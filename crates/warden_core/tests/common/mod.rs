#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use warden_core::db::open_db_in_memory;
use warden_core::settings::{DatabaseSettings, FirstAdminSettings, SecuritySettings};
use warden_core::{
    default_bindings, BcryptHasher, NameCreate, PasswordHasher, RoleCreate, SqlUnitOfWork,
    SqliteDriver, StorageSettings, UserCreate,
};

pub const TEST_BCRYPT_COST: u32 = 4;
pub const ADMIN_EMAIL: &str = "root@example.com";
pub const ADMIN_PASSWORD: &str = "root-secret";

pub fn test_hasher() -> Arc<dyn PasswordHasher> {
    Arc::new(BcryptHasher::new(TEST_BCRYPT_COST).unwrap())
}

/// Unit of work over a fresh in-memory database.
pub fn memory_uow() -> SqlUnitOfWork {
    let hasher = test_hasher();
    let driver = SqliteDriver::new(":memory:", Arc::clone(&hasher));
    let registry = default_bindings(&driver).unwrap();
    SqlUnitOfWork::new(open_db_in_memory().unwrap(), registry, hasher)
}

pub fn file_settings(dir: &Path) -> StorageSettings {
    StorageSettings {
        database: DatabaseSettings {
            path: dir.join("data").join("warden.sqlite3"),
        },
        security: SecuritySettings {
            bcrypt_cost: TEST_BCRYPT_COST,
        },
        first_admin: Some(FirstAdminSettings {
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
        ..StorageSettings::default()
    }
}

pub fn role(name: &str) -> RoleCreate {
    RoleCreate::new(name, None)
}

pub fn user(email: &str, roles: &[&str]) -> UserCreate {
    UserCreate {
        roles: roles.iter().map(|role| role.to_string()).collect(),
        ..UserCreate::new(email, "secret")
    }
}

pub fn named_user(email: &str, first: &str, last: &str) -> UserCreate {
    UserCreate {
        name: Some(NameCreate::new(first, last)),
        ..UserCreate::new(email, "secret")
    }
}
