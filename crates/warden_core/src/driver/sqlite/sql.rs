//! Row conversion and query-building helpers shared by SQLite repositories.

use crate::model::Uid;
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{ffi, ErrorCode};
use uuid::Uuid;

pub(crate) fn uid_text(uid: Uid) -> String {
    uid.to_string()
}

pub(crate) fn parse_uid(value: &str, column: &'static str) -> RepoResult<Uid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uid value `{value}` in {column}")))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn parse_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn count_value(count: usize) -> Value {
    Value::Integer(i64::try_from(count).unwrap_or(i64::MAX))
}

/// Appends `LIMIT`/`OFFSET` clauses for `skip` and an optional `limit`.
pub(crate) fn push_paging(
    sql: &mut String,
    bind_values: &mut Vec<Value>,
    skip: usize,
    limit: Option<usize>,
) {
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        bind_values.push(count_value(limit));
        if skip > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(count_value(skip));
        }
    } else if skip > 0 {
        sql.push_str(" LIMIT -1 OFFSET ?");
        bind_values.push(count_value(skip));
    }
}

/// Fails with `RepoError::NotFound` when a write keyed by `uid` touched no row.
pub(crate) fn require_row(changed: usize, entity: &'static str, uid: Uid) -> RepoResult<()> {
    if changed == 0 {
        return Err(RepoError::NotFound { entity, uid });
    }
    Ok(())
}

/// Maps uniqueness violations to `RepoError::Conflict`.
pub(crate) fn write_error(err: rusqlite::Error) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        let unique = matches!(
            failure.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        );
        if failure.code == ErrorCode::ConstraintViolation && unique {
            return RepoError::Conflict(
                message
                    .clone()
                    .unwrap_or_else(|| "uniqueness constraint failed".to_string()),
            );
        }
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::{parse_bool, parse_uid, push_paging, write_error};
    use crate::repo::RepoError;
    use rusqlite::types::Value;
    use rusqlite::Connection;

    #[test]
    fn paging_clauses_follow_skip_and_limit() {
        let mut sql = String::from("SELECT 1");
        let mut binds = Vec::new();
        push_paging(&mut sql, &mut binds, 0, None);
        assert_eq!(sql, "SELECT 1");
        assert!(binds.is_empty());

        push_paging(&mut sql, &mut binds, 5, None);
        assert_eq!(sql, "SELECT 1 LIMIT -1 OFFSET ?");
        assert_eq!(binds, vec![Value::Integer(5)]);

        let mut sql = String::from("SELECT 1");
        let mut binds = Vec::new();
        push_paging(&mut sql, &mut binds, 2, Some(10));
        assert_eq!(sql, "SELECT 1 LIMIT ? OFFSET ?");
        assert_eq!(binds, vec![Value::Integer(10), Value::Integer(2)]);
    }

    #[test]
    fn malformed_columns_are_invalid_data() {
        assert!(matches!(
            parse_uid("nope", "names.uid"),
            Err(RepoError::InvalidData(_))
        ));
        assert!(matches!(
            parse_bool(2, "users.is_active"),
            Err(RepoError::InvalidData(_))
        ));
        assert!(parse_bool(1, "users.is_active").expect("valid bool"));
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t (v) VALUES ('a');")
            .expect("schema");
        let err = conn
            .execute("INSERT INTO t (v) VALUES ('a')", [])
            .expect_err("duplicate must fail");
        assert!(matches!(write_error(err), RepoError::Conflict(_)));

        let other = conn
            .execute("INSERT INTO missing (v) VALUES ('a')", [])
            .expect_err("missing table must fail");
        assert!(matches!(write_error(other), RepoError::Db(_)));
    }
}
