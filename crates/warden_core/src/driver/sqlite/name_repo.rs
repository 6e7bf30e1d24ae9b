use super::session::{live_session, SqlSession};
use super::sql::{parse_uid, push_paging, require_row, uid_text, write_error};
use crate::model::name::{Name, NameCreate, NameUpdate};
use crate::model::{new_uid, Uid};
use crate::repo::name_repo::NameRepository;
use crate::repo::{RepoResult, Repository};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::rc::{Rc, Weak};

pub const TABLE: &str = "names";

pub(crate) const NAME_COLUMNS_SQL: &str = "n.uid AS name_uid,
        n.title AS name_title,
        n.first AS name_first,
        n.middle AS name_middle,
        n.last AS name_last,
        n.suffix AS name_suffix,
        n.preferred AS name_preferred";

/// SQLite-backed `Name` repository.
pub struct SqlNameRepository {
    session: Weak<SqlSession>,
}

impl SqlNameRepository {
    pub fn new(session: &Rc<SqlSession>) -> Self {
        Self {
            session: Rc::downgrade(session),
        }
    }

    fn query(
        &self,
        filter: &str,
        order: &str,
        mut bind_values: Vec<Value>,
        skip: usize,
        limit: Option<usize>,
    ) -> RepoResult<Vec<Name>> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;

        let mut sql = format!("SELECT {NAME_COLUMNS_SQL} FROM names n {filter} ORDER BY {order}");
        push_paging(&mut sql, &mut bind_values, skip, limit);
        select_names(&conn, &sql, bind_values)
    }
}

impl Repository for SqlNameRepository {
    type Entity = Name;
    type Create = NameCreate;
    type Update = NameUpdate;

    fn make(&self, payload: NameCreate) -> RepoResult<Name> {
        Ok(Name {
            uid: new_uid(),
            title: payload.title,
            first: payload.first,
            middle: payload.middle,
            last: payload.last,
            suffix: payload.suffix,
            preferred: payload.preferred,
        })
    }

    fn insert(&self, name: Name) -> RepoResult<Name> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;
        conn.execute(
            "INSERT INTO names (uid, title, first, middle, last, suffix, preferred)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params_from_iter(name_values(&name)),
        )
        .map_err(write_error)?;

        Ok(name)
    }

    fn replace(&self, name: Name) -> RepoResult<Name> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;
        let changed = conn
            .execute(
                "UPDATE names SET
                    title = ?2,
                    first = ?3,
                    middle = ?4,
                    last = ?5,
                    suffix = ?6,
                    preferred = ?7
                 WHERE uid = ?1;",
                params_from_iter(name_values(&name)),
            )
            .map_err(write_error)?;
        require_row(changed, "Name", name.uid)?;

        Ok(name)
    }

    fn load(&self, uid: Uid) -> RepoResult<Option<Name>> {
        let mut names = self.query(
            "WHERE n.uid = ?",
            "n.uid",
            vec![Value::Text(uid_text(uid))],
            0,
            None,
        )?;
        Ok(names.pop())
    }

    fn delete(&self, name: Name) -> RepoResult<Name> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;
        let changed = conn.execute("DELETE FROM names WHERE uid = ?1;", [uid_text(name.uid)])?;
        require_row(changed, "Name", name.uid)?;
        Ok(name)
    }

    fn get_multi(&self, skip: usize, limit: Option<usize>) -> RepoResult<Vec<Name>> {
        self.query("", "n.last, n.first, n.uid", Vec::new(), skip, limit)
    }
}

impl NameRepository for SqlNameRepository {
    fn get_by_last(&self, last: &str) -> RepoResult<Vec<Name>> {
        self.query(
            "WHERE n.last = ?",
            "n.first, n.uid",
            vec![Value::Text(last.to_string())],
            0,
            None,
        )
    }

    fn get_by_first(&self, first: &str) -> RepoResult<Vec<Name>> {
        self.query(
            "WHERE n.first = ?",
            "n.last, n.uid",
            vec![Value::Text(first.to_string())],
            0,
            None,
        )
    }

    fn get_by_full(&self, first: &str, last: &str) -> RepoResult<Vec<Name>> {
        self.query(
            "WHERE n.first = ? AND n.last = ?",
            "n.last, n.first, n.uid",
            vec![Value::Text(first.to_string()), Value::Text(last.to_string())],
            0,
            None,
        )
    }
}

/// Bind values in column order: uid, title, first, middle, last, suffix,
/// preferred.
fn name_values(name: &Name) -> Vec<Value> {
    vec![
        Value::Text(uid_text(name.uid)),
        Value::from(name.title.clone()),
        Value::Text(name.first.clone()),
        Value::from(name.middle.clone()),
        Value::Text(name.last.clone()),
        Value::from(name.suffix.clone()),
        Value::from(name.preferred.clone()),
    ]
}

fn select_names(conn: &Connection, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Name>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut names = Vec::new();
    while let Some(row) = rows.next()? {
        names.push(parse_name_row(row)?);
    }
    Ok(names)
}

/// Parses the `name_*` columns selected by [`NAME_COLUMNS_SQL`].
pub(crate) fn parse_name_row(row: &Row<'_>) -> RepoResult<Name> {
    let uid_text: String = row.get("name_uid")?;
    Ok(Name {
        uid: parse_uid(&uid_text, "names.uid")?,
        title: row.get("name_title")?,
        first: row.get("name_first")?,
        middle: row.get("name_middle")?,
        last: row.get("name_last")?,
        suffix: row.get("name_suffix")?,
        preferred: row.get("name_preferred")?,
    })
}
