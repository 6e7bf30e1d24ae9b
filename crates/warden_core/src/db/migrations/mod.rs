//! Versioned schema for the identity tables.
//!
//! # Responsibility
//! - Own the DDL for `names`, `roles`, `users` and the `users_roles` link
//!   table, one SQL script per schema version.
//! - Bring a connection from its recorded version up to `latest_version()`
//!   inside one transaction.
//!
//! # Invariants
//! - Script versions start at 1 and increase by one.
//! - The schema version lives in `PRAGMA user_version`; 0 means no identity
//!   tables yet.
//! - A database stamped newer than this build is refused, never downgraded.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

/// One schema step: the DDL that moves the database to `version`.
#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    ddl: &'static str,
}

/// Version 1 creates the four identity tables, their lookup indexes and the
/// referential actions (`ON DELETE SET NULL` for a user's name, `CASCADE`
/// for role links).
const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    ddl: include_str!("0001_init.sql"),
}];

/// Newest schema version this build can create.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Runs every schema step above the recorded version, stamping each one.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let recorded = current_user_version(conn)?;
    let latest = latest_version();
    if recorded > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: recorded,
            latest_supported: latest,
        });
    }

    let pending: Vec<&SchemaStep> = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > recorded)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in pending {
        tx.execute_batch(step.ddl)?;
        tx.pragma_update(None, "user_version", step.version)?;
    }
    tx.commit()?;
    Ok(())
}

/// Reads the schema version recorded in `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?;
    Ok(version)
}
