use super::name_repo::{parse_name_row, NAME_COLUMNS_SQL};
use super::role_repo::load_user_roles;
use super::session::{live_session, SqlSession};
use super::sql::{
    bool_to_int, count_value, parse_bool, parse_uid, push_paging, require_row, uid_text,
    write_error,
};
use crate::model::name::Name;
use crate::model::role::Role;
use crate::model::user::{User, UserCreate, UserUpdate};
use crate::model::Uid;
use crate::repo::name_repo::NameRepository;
use crate::repo::role_repo::RoleRepository;
use crate::repo::user_repo::{RoleFilter, UserComposer, UserRepository};
use crate::repo::{FieldMap, RepoError, RepoResult, Repository};
use crate::security::PasswordHasher;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use std::sync::Arc;

pub const TABLE: &str = "users";
pub const ROLE_LINK_TABLE: &str = "users_roles";

const DEFAULT_ORDER_SQL: &str = "ORDER BY u.email, u.uid";

/// SQLite-backed `User` repository.
///
/// Names and roles are composed through the repositories bound to the same
/// session.
pub struct SqlUserRepository {
    session: Weak<SqlSession>,
    hasher: Arc<dyn PasswordHasher>,
}

impl SqlUserRepository {
    pub fn new(session: &Rc<SqlSession>) -> Self {
        Self {
            session: Rc::downgrade(session),
            hasher: session.hasher(),
        }
    }

    fn with_composer<T>(
        &self,
        compose: impl FnOnce(&UserComposer<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let session = live_session(&self.session)?;
        let names = session.repository_for::<Name, dyn NameRepository>()?;
        let roles = session.repository_for::<Role, dyn RoleRepository>()?;
        let composer = UserComposer::new(names.as_ref(), roles.as_ref(), self.hasher.as_ref());
        compose(&composer)
    }

    fn query(
        &self,
        filter: &str,
        mut bind_values: Vec<Value>,
        skip: usize,
        limit: Option<usize>,
    ) -> RepoResult<Vec<User>> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;

        let mut sql = format!(
            "SELECT
                u.id AS user_id,
                u.uid AS user_uid,
                u.email,
                u.hashed_password,
                u.is_active,
                u.is_superuser,
                u.is_admin,
                {NAME_COLUMNS_SQL}
             FROM users u
             LEFT JOIN names n ON n.id = u.name_id
             {filter}
             {DEFAULT_ORDER_SQL}"
        );
        push_paging(&mut sql, &mut bind_values, skip, limit);

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut loaded = Vec::new();
        while let Some(row) = rows.next()? {
            loaded.push(parse_user_row(row)?);
        }

        let mut users = Vec::with_capacity(loaded.len());
        for (user_id, mut user) in loaded {
            user.roles = load_user_roles(&conn, user_id)?;
            users.push(user);
        }
        Ok(users)
    }

    /// Relinks the user's roles, then reads the user back as stored.
    fn link_roles_and_reload(&self, conn: &Connection, user: &User) -> RepoResult<User> {
        let user_id: i64 = conn.query_row(
            "SELECT id FROM users WHERE uid = ?1;",
            [uid_text(user.uid)],
            |row| row.get(0),
        )?;
        replace_role_links(conn, user_id, &user.roles)?;

        self.load(user.uid)?.ok_or(RepoError::NotFound {
            entity: "User",
            uid: user.uid,
        })
    }
}

impl Repository for SqlUserRepository {
    type Entity = User;
    type Create = UserCreate;
    type Update = UserUpdate;

    fn make(&self, payload: UserCreate) -> RepoResult<User> {
        self.with_composer(|composer| composer.make_user(payload))
    }

    fn merge(&self, user: User, data: FieldMap) -> RepoResult<User> {
        self.with_composer(|composer| composer.merge_user(user, data))
    }

    fn insert(&self, user: User) -> RepoResult<User> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;
        conn.execute(
            "INSERT INTO users
                (uid, email, hashed_password, is_active, is_superuser, is_admin, name_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, (SELECT id FROM names WHERE uid = ?7));",
            params_from_iter(user_values(&user)),
        )
        .map_err(write_error)?;

        self.link_roles_and_reload(&conn, &user)
    }

    /// Rewrites the user row and its role links. The owned name is written
    /// by `merge`, never here; a name deleted meanwhile stays deleted.
    fn replace(&self, user: User) -> RepoResult<User> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;
        let changed = conn
            .execute(
                "UPDATE users SET
                    email = ?2,
                    hashed_password = ?3,
                    is_active = ?4,
                    is_superuser = ?5,
                    is_admin = ?6,
                    name_id = (SELECT id FROM names WHERE uid = ?7)
                 WHERE uid = ?1;",
                params_from_iter(user_values(&user)),
            )
            .map_err(write_error)?;
        require_row(changed, "User", user.uid)?;

        self.link_roles_and_reload(&conn, &user)
    }

    fn load(&self, uid: Uid) -> RepoResult<Option<User>> {
        let mut users = self.query(
            "WHERE u.uid = ?",
            vec![Value::Text(uid_text(uid))],
            0,
            None,
        )?;
        Ok(users.pop())
    }

    /// Deletes the user together with its owned name.
    fn delete(&self, user: User) -> RepoResult<User> {
        let session = live_session(&self.session)?;
        let conn = session.connection()?;

        let name_id: Option<i64> = conn
            .query_row(
                "SELECT name_id FROM users WHERE uid = ?1;",
                [uid_text(user.uid)],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let changed = conn.execute("DELETE FROM users WHERE uid = ?1;", [uid_text(user.uid)])?;
        require_row(changed, "User", user.uid)?;
        if let Some(name_id) = name_id {
            conn.execute("DELETE FROM names WHERE id = ?1;", [name_id])?;
        }

        Ok(user)
    }

    fn get_multi(&self, skip: usize, limit: Option<usize>) -> RepoResult<Vec<User>> {
        self.query("", Vec::new(), skip, limit)
    }
}

impl UserRepository for SqlUserRepository {
    fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let mut users = self.query(
            "WHERE u.email = ?",
            vec![Value::Text(email.to_string())],
            0,
            None,
        )?;
        Ok(users.pop())
    }

    fn get_by_role(
        &self,
        filter: Option<&RoleFilter>,
        skip: usize,
        limit: Option<usize>,
    ) -> RepoResult<Vec<User>> {
        let mut bind_values = Vec::new();
        let condition = role_condition(filter, &mut bind_values);
        self.query(&format!("WHERE {condition}"), bind_values, skip, limit)
    }

    fn password_hasher(&self) -> &dyn PasswordHasher {
        self.hasher.as_ref()
    }
}

/// Builds the `WHERE` condition for a role filter.
///
/// Each AND-group becomes a `HAVING COUNT(DISTINCT ...)` subquery; groups are
/// OR-ed together.
fn role_condition(filter: Option<&RoleFilter>, bind_values: &mut Vec<Value>) -> String {
    let Some(filter) = filter else {
        return "NOT EXISTS (SELECT 1 FROM users_roles ur WHERE ur.user_id = u.id)".to_string();
    };

    let groups = filter.groups();
    if groups.is_empty() {
        return "0".to_string();
    }

    let mut clauses = Vec::with_capacity(groups.len());
    for group in groups {
        if group.is_empty() {
            clauses.push("1".to_string());
            continue;
        }

        let placeholders = vec!["?"; group.len()].join(", ");
        let required = group.len();
        bind_values.extend(group.into_iter().map(Value::Text));
        bind_values.push(count_value(required));
        clauses.push(format!(
            "u.id IN (
                SELECT ur.user_id
                FROM users_roles ur
                INNER JOIN roles r ON r.id = ur.role_id
                WHERE r.name IN ({placeholders})
                GROUP BY ur.user_id
                HAVING COUNT(DISTINCT r.id) = ?
            )"
        ));
    }

    format!("({})", clauses.join(" OR "))
}

/// Replaces the role links of one user. Roles deleted since the user was
/// loaded are skipped; explicit role names are checked when they are
/// resolved.
fn replace_role_links(conn: &Connection, user_id: i64, roles: &[Role]) -> RepoResult<()> {
    let unique: BTreeSet<Uid> = roles.iter().map(|role| role.uid).collect();

    conn.execute("DELETE FROM users_roles WHERE user_id = ?1;", [user_id])?;
    for role_uid in unique {
        conn.execute(
            "INSERT INTO users_roles (user_id, role_id)
             SELECT ?1, id FROM roles WHERE uid = ?2;",
            params![user_id, uid_text(role_uid)],
        )?;
    }
    Ok(())
}

/// Bind values in column order: uid, email, hashed_password, is_active,
/// is_superuser, is_admin, owned name uid.
fn user_values(user: &User) -> Vec<Value> {
    vec![
        Value::Text(uid_text(user.uid)),
        Value::Text(user.email.clone()),
        Value::Text(user.hashed_password.clone()),
        Value::Integer(bool_to_int(user.is_active)),
        Value::Integer(bool_to_int(user.is_superuser)),
        Value::Integer(bool_to_int(user.is_admin)),
        Value::from(user.name.as_ref().map(|name| uid_text(name.uid))),
    ]
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<(i64, User)> {
    let uid_text: String = row.get("user_uid")?;
    let name = match row.get::<_, Option<String>>("name_uid")? {
        Some(_) => Some(parse_name_row(row)?),
        None => None,
    };

    let user = User {
        uid: parse_uid(&uid_text, "users.uid")?,
        email: row.get("email")?,
        hashed_password: row.get("hashed_password")?,
        is_active: parse_bool(row.get("is_active")?, "users.is_active")?,
        is_superuser: parse_bool(row.get("is_superuser")?, "users.is_superuser")?,
        is_admin: parse_bool(row.get("is_admin")?, "users.is_admin")?,
        name,
        roles: Vec::new(),
    };
    Ok((row.get("user_id")?, user))
}
