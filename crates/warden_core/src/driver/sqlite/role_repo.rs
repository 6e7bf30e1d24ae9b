use super::session::{live_session, SqlSession};
use super::sql::{parse_uid, push_paging, require_row, uid_text, write_error};
use crate::model::role::{normalize_role_name, Role, RoleCreate, RoleUpdate};
use crate::model::{new_uid, Uid};
use crate::repo::role_repo::RoleRepository;
use crate::repo::{RepoError, RepoResult, Repository};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::rc::{Rc, Weak};

pub const TABLE: &str = "roles";

const ROLE_COLUMNS_SQL: &str =
    "r.uid AS role_uid, r.name AS role_name, r.description AS role_description";

/// SQLite-backed `Role` repository. Names are stored lowercase.
pub struct SqlRoleRepository {
    session: Weak<SqlSession>,
}

impl SqlRoleRepository {
    pub fn new(session: &Rc<SqlSession>) -> Self {
        Self {
            session: Rc::downgrade(session),
        }
    }

    fn query(
        &self,
        filter: &str,
        mut bind_values: Vec<Value>,
        skip: usize,
        limit: Option<usize>,
    ) -> RepoResult<Vec<Role>> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;

        let mut sql =
            format!("SELECT {ROLE_COLUMNS_SQL} FROM roles r {filter} ORDER BY r.name, r.uid");
        push_paging(&mut sql, &mut bind_values, skip, limit);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut roles = Vec::new();
        while let Some(row) = rows.next()? {
            roles.push(parse_role_row(row)?);
        }
        Ok(roles)
    }
}

impl Repository for SqlRoleRepository {
    type Entity = Role;
    type Create = RoleCreate;
    type Update = RoleUpdate;

    fn make(&self, payload: RoleCreate) -> RepoResult<Role> {
        Ok(Role {
            uid: new_uid(),
            name: payload.name,
            description: payload.description,
        })
    }

    fn insert(&self, role: Role) -> RepoResult<Role> {
        let role = normalized(role)?;
        let session = live_session(&self.session)?;
        let conn = session.connection()?;
        conn.execute(
            "INSERT INTO roles (uid, name, description) VALUES (?1, ?2, ?3);",
            params![
                uid_text(role.uid),
                role.name.as_str(),
                role.description.as_deref(),
            ],
        )
        .map_err(write_error)?;

        Ok(role)
    }

    fn replace(&self, role: Role) -> RepoResult<Role> {
        let role = normalized(role)?;
        let session = live_session(&self.session)?;
        let conn = session.connection()?;
        let changed = conn
            .execute(
                "UPDATE roles SET name = ?2, description = ?3 WHERE uid = ?1;",
                params![
                    uid_text(role.uid),
                    role.name.as_str(),
                    role.description.as_deref(),
                ],
            )
            .map_err(write_error)?;
        require_row(changed, "Role", role.uid)?;

        Ok(role)
    }

    fn load(&self, uid: Uid) -> RepoResult<Option<Role>> {
        let mut roles = self.query(
            "WHERE r.uid = ?",
            vec![Value::Text(uid_text(uid))],
            0,
            None,
        )?;
        Ok(roles.pop())
    }

    fn delete(&self, role: Role) -> RepoResult<Role> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;
        let changed = conn.execute("DELETE FROM roles WHERE uid = ?1;", [uid_text(role.uid)])?;
        require_row(changed, "Role", role.uid)?;
        Ok(role)
    }

    fn get_multi(&self, skip: usize, limit: Option<usize>) -> RepoResult<Vec<Role>> {
        self.query("", Vec::new(), skip, limit)
    }
}

impl RoleRepository for SqlRoleRepository {
    fn get_by_name(&self, name: &str) -> RepoResult<Option<Role>> {
        let mut roles = self.query(
            "WHERE r.name = ?",
            vec![Value::Text(normalize_role_name(name))],
            0,
            None,
        )?;
        Ok(roles.pop())
    }
}

/// Lowercases the role name; an empty name is rejected.
fn normalized(role: Role) -> RepoResult<Role> {
    let name = normalize_role_name(&role.name);
    if name.is_empty() {
        return Err(RepoError::Validation("role name must not be empty".to_string()));
    }
    Ok(Role { name, ..role })
}

/// Roles linked to one user, ordered by name.
pub(crate) fn load_user_roles(conn: &Connection, user_id: i64) -> RepoResult<Vec<Role>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ROLE_COLUMNS_SQL}
         FROM roles r
         INNER JOIN users_roles ur ON ur.role_id = r.id
         WHERE ur.user_id = ?1
         ORDER BY r.name, r.uid;"
    ))?;
    let mut rows = stmt.query([user_id])?;
    let mut roles = Vec::new();
    while let Some(row) = rows.next()? {
        roles.push(parse_role_row(row)?);
    }
    Ok(roles)
}

fn parse_role_row(row: &Row<'_>) -> RepoResult<Role> {
    let uid_text: String = row.get("role_uid")?;
    Ok(Role {
        uid: parse_uid(&uid_text, "roles.uid")?,
        name: row.get("role_name")?,
        description: row.get("role_description")?,
    })
}
