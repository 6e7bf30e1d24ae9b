//! Unit of work: one transactional storage session plus the repositories
//! bound to it.
//!
//! # Responsibility
//! - Expose commit/rollback/close over one backend session.
//! - Hand out memoized repositories by attribute name or entity type.
//! - Provide scoped acquisition that commits on success and rolls back on
//!   error or panic.
//!
//! # Invariants
//! - Only the outermost scope exit commits or rolls back; nested exits only
//!   unwind the depth counter.
//! - A failed rollback never replaces the error that triggered it.
//! - A unit of work is single-threaded (`!Send`); create one per operation.

use crate::model::name::Name;
use crate::model::role::Role;
use crate::model::user::User;
use crate::model::{Entity, ModelDescriptor};
use crate::repo::name_repo::NameRepository;
use crate::repo::role_repo::RoleRepository;
use crate::repo::user_repo::UserRepository;
use crate::repo::{RepoError, RepoResult};
use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

pub mod registry;

pub use registry::{
    downcast_repository, RegistryBuilder, RegistryError, RepoFactory, RepositoryKey,
    RepositoryRegistry, RepositorySlots, RESERVED_ATTRIBUTES,
};

/// Nesting depth of active scopes on one unit of work.
#[derive(Debug, Default)]
pub struct ScopeDepth(Cell<usize>);

impl ScopeDepth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }

    /// Enters one level and returns the new depth.
    pub fn enter(&self) -> usize {
        let depth = self.0.get() + 1;
        self.0.set(depth);
        depth
    }

    /// Leaves one level and returns the remaining depth.
    pub fn exit(&self) -> usize {
        let depth = self.0.get().saturating_sub(1);
        self.0.set(depth);
        depth
    }
}

/// Transactional session contract implemented by storage drivers.
pub trait UnitOfWork {
    /// Persists pending writes.
    fn commit(&self) -> RepoResult<()>;

    /// Discards pending writes.
    fn rollback(&self) -> RepoResult<()>;

    /// Releases backend resources. Safe to call more than once.
    fn close(&self) -> RepoResult<()>;

    fn scope_depth(&self) -> &ScopeDepth;

    /// Resolves the repository bound under `key`, constructing it on first
    /// access.
    fn resolve(&self, key: RepositoryKey<'_>) -> RepoResult<Rc<dyn Any>>;

    fn depth(&self) -> usize {
        self.scope_depth().get()
    }
}

/// Typed accessors and scoped acquisition for every unit of work.
pub trait UnitOfWorkExt: UnitOfWork {
    /// Repository bound under `attribute`, as handler type `H`.
    fn repository<H: ?Sized + 'static>(&self, attribute: &str) -> RepoResult<Rc<H>> {
        let key = RepositoryKey::Attribute(attribute);
        downcast_repository(self.resolve(key)?, key)
    }

    /// Repository bound to entity `E`, as handler type `H`.
    fn repository_for<E: Entity, H: ?Sized + 'static>(&self) -> RepoResult<Rc<H>> {
        let key = RepositoryKey::Model(ModelDescriptor::of::<E>());
        downcast_repository(self.resolve(key)?, key)
    }

    fn name(&self) -> RepoResult<Rc<dyn NameRepository>> {
        self.repository_for::<Name, dyn NameRepository>()
    }

    fn role(&self) -> RepoResult<Rc<dyn RoleRepository>> {
        self.repository_for::<Role, dyn RoleRepository>()
    }

    fn user(&self) -> RepoResult<Rc<dyn UserRepository>> {
        self.repository_for::<User, dyn UserRepository>()
    }

    /// Runs `work` inside a transactional scope.
    ///
    /// At the outermost level, `Ok` commits and `Err` rolls back before the
    /// error is returned. A commit failure is rolled back and returned.
    fn scope<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce(&Self) -> Result<T, E>,
    {
        let outermost = self.scope_depth().get() == 0;
        let outcome = {
            let _guard = ScopeGuard::enter(self);
            work(self)
        };

        if !outermost {
            return outcome;
        }

        match outcome {
            Ok(value) => match self.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    rollback_quietly(self);
                    Err(E::from(err))
                }
            },
            Err(err) => {
                rollback_quietly(self);
                Err(err)
            }
        }
    }
}

impl<U: UnitOfWork + ?Sized> UnitOfWorkExt for U {}

/// Keeps the depth counter balanced and rolls back when `work` panics.
struct ScopeGuard<'a, U: UnitOfWork + ?Sized> {
    uow: &'a U,
}

impl<'a, U: UnitOfWork + ?Sized> ScopeGuard<'a, U> {
    fn enter(uow: &'a U) -> Self {
        uow.scope_depth().enter();
        Self { uow }
    }
}

impl<U: UnitOfWork + ?Sized> Drop for ScopeGuard<'_, U> {
    fn drop(&mut self) {
        let remaining = self.uow.scope_depth().exit();
        if remaining == 0 && std::thread::panicking() {
            rollback_quietly(self.uow);
        }
    }
}

fn rollback_quietly<U: UnitOfWork + ?Sized>(uow: &U) {
    if let Err(err) = uow.rollback() {
        log::error!("event=uow_rollback module=uow status=error error={err}");
    }
}

#[cfg(test)]
mod tests {
    use super::{RepositoryKey, ScopeDepth, UnitOfWork, UnitOfWorkExt};
    use crate::repo::{RepoError, RepoResult};
    use std::any::Any;
    use std::cell::RefCell;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        depth: ScopeDepth,
        calls: RefCell<Vec<&'static str>>,
        fail_commit: bool,
    }

    impl UnitOfWork for Recorder {
        fn commit(&self) -> RepoResult<()> {
            self.calls.borrow_mut().push("commit");
            if self.fail_commit {
                return Err(RepoError::Conflict("commit refused".to_string()));
            }
            Ok(())
        }

        fn rollback(&self) -> RepoResult<()> {
            self.calls.borrow_mut().push("rollback");
            Ok(())
        }

        fn close(&self) -> RepoResult<()> {
            self.calls.borrow_mut().push("close");
            Ok(())
        }

        fn scope_depth(&self) -> &ScopeDepth {
            &self.depth
        }

        fn resolve(&self, key: RepositoryKey<'_>) -> RepoResult<Rc<dyn Any>> {
            Err(RepoError::UnboundRepository(key.to_string()))
        }
    }

    #[test]
    fn successful_scope_commits_once() {
        let uow = Recorder::default();
        let value = uow
            .scope(|uow| {
                assert_eq!(uow.depth(), 1);
                Ok::<_, RepoError>(7)
            })
            .expect("scope succeeds");
        assert_eq!(value, 7);
        assert_eq!(uow.depth(), 0);
        assert_eq!(*uow.calls.borrow(), vec!["commit"]);
    }

    #[test]
    fn failing_scope_rolls_back_and_keeps_original_error() {
        let uow = Recorder::default();
        let err = uow
            .scope(|_| Err::<(), _>(RepoError::Validation("bad".to_string())))
            .expect_err("scope fails");
        assert!(matches!(err, RepoError::Validation(message) if message == "bad"));
        assert_eq!(*uow.calls.borrow(), vec!["rollback"]);
        assert_eq!(uow.depth(), 0);
    }

    #[test]
    fn nested_scopes_commit_only_at_outermost_exit() {
        let uow = Recorder::default();
        uow.scope(|outer| -> Result<(), RepoError> {
            outer.scope(|inner| {
                assert_eq!(inner.depth(), 2);
                Ok::<_, RepoError>(())
            })?;
            let inner_err = outer
                .scope(|_| Err::<(), _>(RepoError::Validation("inner".to_string())))
                .expect_err("inner scope fails");
            assert!(matches!(inner_err, RepoError::Validation(_)));
            assert!(outer.calls.borrow().is_empty());
            Ok(())
        })
        .expect("outer scope succeeds");
        assert_eq!(*uow.calls.borrow(), vec!["commit"]);
    }

    #[test]
    fn commit_failure_rolls_back_and_surfaces() {
        let uow = Recorder {
            fail_commit: true,
            ..Recorder::default()
        };
        let err = uow
            .scope(|_| Ok::<_, RepoError>(()))
            .expect_err("commit failure surfaces");
        assert!(matches!(err, RepoError::Conflict(_)));
        assert_eq!(*uow.calls.borrow(), vec!["commit", "rollback"]);
    }

    #[test]
    fn panic_inside_scope_rolls_back() {
        let uow = Recorder::default();
        let result = catch_unwind(AssertUnwindSafe(|| {
            uow.scope(|_| -> Result<(), RepoError> { panic!("boom") })
        }));
        assert!(result.is_err());
        assert_eq!(uow.depth(), 0);
        assert_eq!(*uow.calls.borrow(), vec!["rollback"]);
    }

    #[test]
    fn unbound_typed_accessor_fails() {
        let uow = Recorder::default();
        let err = uow.user().err().expect("nothing is bound");
        assert!(matches!(err, RepoError::UnboundRepository(name) if name == "User"));
    }
}
