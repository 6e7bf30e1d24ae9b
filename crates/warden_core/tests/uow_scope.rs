mod common;

use common::{file_settings, role, ADMIN_EMAIL, ADMIN_PASSWORD};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use warden_core::{
    load_storage, RepoError, RepoResult, Repository, RoleRepository, Storage, UnitOfWork,
    UnitOfWorkExt, UserRepository, REQUIRED_ROLES,
};

fn ready_storage(dir: &tempfile::TempDir) -> Arc<dyn Storage> {
    let storage = load_storage(&file_settings(dir.path())).unwrap();
    storage.setup_storage().unwrap();
    storage
}

fn role_exists(storage: &dyn Storage, name: &str) -> bool {
    let uow = storage.create_uow().unwrap();
    let found = uow.role().unwrap().get_by_name(name).unwrap();
    found.is_some()
}

#[test]
fn setup_seeds_required_roles_and_first_admin() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);
    assert_eq!(storage.driver_name(), "sqlite");

    let uow = storage.create_uow().unwrap();
    let roles = uow.role().unwrap();
    for (name, description) in REQUIRED_ROLES {
        let seeded = roles.get_by_name(name).unwrap().unwrap();
        assert_eq!(seeded.description.as_deref(), Some(*description));
    }

    let admin = uow
        .user()
        .unwrap()
        .authenticate(ADMIN_EMAIL, ADMIN_PASSWORD)
        .unwrap()
        .unwrap();
    assert!(admin.is_active);
    assert!(admin.is_admin);
    assert!(admin.is_superuser);
    assert!(admin.has_role("admin"));
    assert!(admin.has_role("user"));
}

#[test]
fn setup_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);
    storage.setup_storage().unwrap();
    storage.init_storage().unwrap();

    let uow = storage.create_uow().unwrap();
    assert_eq!(
        uow.role().unwrap().get_multi(0, None).unwrap().len(),
        REQUIRED_ROLES.len()
    );
    assert_eq!(uow.user().unwrap().get_multi(0, None).unwrap().len(), 1);
}

#[test]
fn storage_is_not_ready_before_setup() {
    let dir = tempfile::tempdir().unwrap();
    let storage = load_storage(&file_settings(dir.path())).unwrap();

    assert!(storage.storage_ready().is_err());
    assert!(storage.create_uow().is_err());

    storage.setup_storage().unwrap();
    assert!(storage.storage_ready().unwrap());
    assert!(storage.create_uow().is_ok());
}

#[test]
fn successful_scope_commits() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);

    let uow = storage.create_uow().unwrap();
    let created = uow
        .scope(|uow| uow.role()?.create(role("editor")))
        .unwrap();
    assert_eq!(created.name, "editor");
    drop(uow);

    assert!(role_exists(storage.as_ref(), "editor"));
}

#[test]
fn failing_scope_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);

    let uow = storage.create_uow().unwrap();
    let result: RepoResult<()> = uow.scope(|uow| {
        uow.role()?.create(role("editor"))?;
        Err(RepoError::Validation("abort".to_string()))
    });
    assert!(matches!(result, Err(RepoError::Validation(message)) if message == "abort"));

    assert!(uow.role().unwrap().get_by_name("editor").unwrap().is_none());
    drop(uow);
    assert!(!role_exists(storage.as_ref(), "editor"));
}

#[test]
fn inner_scope_error_is_committed_when_outer_scope_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);

    let uow = storage.create_uow().unwrap();
    uow.scope(|outer| -> RepoResult<()> {
        outer.role()?.create(role("editor"))?;
        let inner: RepoResult<()> = outer.scope(|inner| {
            inner.role()?.create(role("viewer"))?;
            Err(RepoError::Validation("inner".to_string()))
        });
        assert!(inner.is_err());
        assert_eq!(outer.depth(), 1);
        Ok(())
    })
    .unwrap();
    assert_eq!(uow.depth(), 0);
    drop(uow);

    assert!(role_exists(storage.as_ref(), "editor"));
    assert!(role_exists(storage.as_ref(), "viewer"));
}

#[test]
fn panicking_scope_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);

    let uow = storage.create_uow().unwrap();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _: RepoResult<()> = uow.scope(|uow| {
            uow.role()?.create(role("editor"))?;
            panic!("scope body failed");
        });
    }));
    assert!(outcome.is_err());
    assert_eq!(uow.depth(), 0);

    assert!(uow.role().unwrap().get_by_name("editor").unwrap().is_none());
    drop(uow);
    assert!(!role_exists(storage.as_ref(), "editor"));
}

#[test]
fn uncommitted_writes_are_discarded_when_unit_of_work_drops() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);

    let uow = storage.create_uow().unwrap();
    uow.role().unwrap().create(role("editor")).unwrap();
    drop(uow);

    assert!(!role_exists(storage.as_ref(), "editor"));
}

#[test]
fn explicit_commit_and_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);

    let uow = storage.create_uow().unwrap();
    let roles = uow.role().unwrap();
    roles.create(role("editor")).unwrap();
    uow.commit().unwrap();
    roles.create(role("viewer")).unwrap();
    uow.rollback().unwrap();
    uow.close().unwrap();

    assert!(role_exists(storage.as_ref(), "editor"));
    assert!(!role_exists(storage.as_ref(), "viewer"));
}

#[test]
fn units_of_work_are_isolated_until_commit() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ready_storage(&dir);

    let writer = storage.create_uow().unwrap();
    let users = writer.user().unwrap();
    let admin = users.get_by_email(ADMIN_EMAIL).unwrap().unwrap();
    users.remove(admin.uid).unwrap();

    let reader = storage.create_uow().unwrap();
    assert!(reader
        .user()
        .unwrap()
        .get_by_email(ADMIN_EMAIL)
        .unwrap()
        .is_some());
    reader.close().unwrap();

    writer.commit().unwrap();
    let reader = storage.create_uow().unwrap();
    assert!(reader
        .user()
        .unwrap()
        .get_by_email(ADMIN_EMAIL)
        .unwrap()
        .is_none());
}
