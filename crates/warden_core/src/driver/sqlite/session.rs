//! SQLite session and unit of work.
//!
//! # Responsibility
//! - Own one connection and its lazily started transaction.
//! - Memoize repositories bound to this session.
//!
//! # Invariants
//! - A transaction is open from the first statement until commit/rollback.
//! - Repositories hold only weak references; the unit of work owns the
//!   session and closes it when dropped.

use crate::model::{Entity, ModelDescriptor};
use crate::repo::{RepoError, RepoResult};
use crate::security::PasswordHasher;
use crate::uow::{
    downcast_repository, RepositoryKey, RepositoryRegistry, RepositorySlots, ScopeDepth,
    UnitOfWork,
};
use log::{error, info, warn};
use rusqlite::Connection;
use std::any::Any;
use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Connection-scoped state shared by the repositories of one unit of work.
pub struct SqlSession {
    connection: RefCell<Option<Connection>>,
    registry: Arc<RepositoryRegistry<SqlSession>>,
    slots: RepositorySlots,
    hasher: Arc<dyn PasswordHasher>,
}

impl SqlSession {
    /// Returns the connection, beginning a transaction if none is open.
    pub fn connection(&self) -> RepoResult<Ref<'_, Connection>> {
        let conn = Ref::filter_map(self.connection.borrow(), Option::as_ref)
            .map_err(|_| RepoError::SessionClosed)?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN;")?;
        }
        Ok(conn)
    }

    pub fn hasher(&self) -> Arc<dyn PasswordHasher> {
        Arc::clone(&self.hasher)
    }

    pub fn is_closed(&self) -> bool {
        self.connection.borrow().is_none()
    }

    pub fn resolve(self: &Rc<Self>, key: RepositoryKey<'_>) -> RepoResult<Rc<dyn Any>> {
        self.slots.resolve(&self.registry, self, key)
    }

    /// Repository bound to entity `E` on this session.
    pub fn repository_for<E: Entity, H: ?Sized + 'static>(self: &Rc<Self>) -> RepoResult<Rc<H>> {
        let key = RepositoryKey::Model(ModelDescriptor::of::<E>());
        downcast_repository(self.resolve(key)?, key)
    }

    fn commit(&self) -> RepoResult<()> {
        let guard = self.connection.borrow();
        let conn = guard.as_ref().ok_or(RepoError::SessionClosed)?;
        if conn.is_autocommit() {
            return Ok(());
        }

        match conn.execute_batch("COMMIT;") {
            Ok(()) => {
                info!("event=uow_commit module=driver.sqlite status=ok");
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=uow_commit module=driver.sqlite status=error error_code=commit_failed error={err}"
                );
                Err(err.into())
            }
        }
    }

    fn rollback(&self) -> RepoResult<()> {
        let guard = self.connection.borrow();
        let Some(conn) = guard.as_ref() else {
            return Ok(());
        };
        rollback_connection(conn)
    }

    fn close(&self) -> RepoResult<()> {
        self.slots.clear();
        let Some(conn) = self.connection.borrow_mut().take() else {
            return Ok(());
        };

        let rolled_back = rollback_connection(&conn);
        let closed = conn.close().map_err(|(_, err)| RepoError::from(err));
        match (&rolled_back, &closed) {
            (Ok(()), Ok(())) => info!("event=uow_close module=driver.sqlite status=ok"),
            _ => warn!("event=uow_close module=driver.sqlite status=error"),
        }
        rolled_back.and(closed)
    }
}

fn rollback_connection(conn: &Connection) -> RepoResult<()> {
    if conn.is_autocommit() {
        return Ok(());
    }

    match conn.execute_batch("ROLLBACK;") {
        Ok(()) => {
            info!("event=uow_rollback module=driver.sqlite status=ok");
            Ok(())
        }
        Err(err) => {
            error!(
                "event=uow_rollback module=driver.sqlite status=error error_code=rollback_failed error={err}"
            );
            Err(err.into())
        }
    }
}

/// Upgrades a repository's weak session handle.
pub(crate) fn live_session(session: &Weak<SqlSession>) -> RepoResult<Rc<SqlSession>> {
    session.upgrade().ok_or(RepoError::SessionClosed)
}

/// Unit of work over one SQLite connection.
pub struct SqlUnitOfWork {
    session: Rc<SqlSession>,
    depth: ScopeDepth,
}

impl SqlUnitOfWork {
    /// Wraps an already configured and migrated connection.
    pub fn new(
        connection: Connection,
        registry: Arc<RepositoryRegistry<SqlSession>>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            session: Rc::new(SqlSession {
                connection: RefCell::new(Some(connection)),
                registry,
                slots: RepositorySlots::new(),
                hasher,
            }),
            depth: ScopeDepth::new(),
        }
    }

    pub fn session(&self) -> &Rc<SqlSession> {
        &self.session
    }
}

impl UnitOfWork for SqlUnitOfWork {
    fn commit(&self) -> RepoResult<()> {
        self.session.commit()
    }

    fn rollback(&self) -> RepoResult<()> {
        self.session.rollback()
    }

    fn close(&self) -> RepoResult<()> {
        self.session.close()
    }

    fn scope_depth(&self) -> &ScopeDepth {
        &self.depth
    }

    fn resolve(&self, key: RepositoryKey<'_>) -> RepoResult<Rc<dyn Any>> {
        self.session.resolve(key)
    }
}

impl Drop for SqlUnitOfWork {
    fn drop(&mut self) {
        if let Err(err) = self.session.close() {
            warn!("event=uow_close module=driver.sqlite status=error error={err}");
        }
    }
}
