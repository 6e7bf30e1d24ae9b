mod common;

use common::{file_settings, memory_uow, test_hasher, ADMIN_EMAIL};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;
use warden_core::db::open_db_in_memory;
use warden_core::model::{Entity, ModelDescriptor, Uid};
use warden_core::settings::FirstAdminSettings;
use warden_core::uow::RepoFactory;
use warden_core::{
    bind_driver, default_bindings, seed_storage, Driver, DriverError, DriverLoader,
    DriverRegistry, Name, NameRepository, RepoError, RepoResult, Repository, RepositoryRegistry,
    Role, RoleRepository, SqlSession, SqlUnitOfWork, SqliteDriver, Storage, StorageSettings,
    UnitOfWork, UnitOfWorkExt, User, UserRepository, REQUIRED_ROLES,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditEntry {
    uid: Uid,
    message: String,
}

impl Entity for AuditEntry {
    const ENTITY: &'static str = "AuditEntry";

    fn uid(&self) -> Uid {
        self.uid
    }
}

struct AuditLog;

impl AuditLog {
    fn label(&self) -> &'static str {
        "audit"
    }
}

/// SQLite-backed driver with a configurable model list.
struct PartialDriver {
    inner: SqliteDriver,
    models: Vec<ModelDescriptor>,
    audit_factory: bool,
}

impl PartialDriver {
    fn new(models: Vec<ModelDescriptor>, audit_factory: bool) -> Self {
        Self {
            inner: SqliteDriver::new(":memory:", test_hasher()),
            models,
            audit_factory,
        }
    }

    fn core_models() -> Vec<ModelDescriptor> {
        vec![
            ModelDescriptor::of::<Name>(),
            ModelDescriptor::of::<Role>(),
            ModelDescriptor::of::<User>(),
        ]
    }
}

impl Driver for PartialDriver {
    type Context = SqlSession;

    fn name(&self) -> &'static str {
        "partial"
    }

    fn models(&self) -> Vec<ModelDescriptor> {
        self.models.clone()
    }

    fn name_repository(context: &Rc<SqlSession>) -> Rc<dyn NameRepository> {
        SqliteDriver::name_repository(context)
    }

    fn role_repository(context: &Rc<SqlSession>) -> Rc<dyn RoleRepository> {
        SqliteDriver::role_repository(context)
    }

    fn user_repository(context: &Rc<SqlSession>) -> Rc<dyn UserRepository> {
        SqliteDriver::user_repository(context)
    }

    fn generic_repository(&self, model: &ModelDescriptor) -> Option<RepoFactory<SqlSession>> {
        if !self.audit_factory || !model.is::<AuditEntry>() {
            return None;
        }
        let factory: RepoFactory<SqlSession> =
            Arc::new(|_: &Rc<SqlSession>| -> Rc<dyn Any> { Rc::new(Rc::new(AuditLog)) });
        Some(factory)
    }

    fn create_uow(
        &self,
        registry: &Arc<RepositoryRegistry<SqlSession>>,
    ) -> RepoResult<Box<dyn UnitOfWork>> {
        self.inner.create_uow(registry)
    }

    fn init_storage(&self) -> RepoResult<()> {
        self.inner.init_storage()
    }

    fn setup_storage(&self) -> RepoResult<()> {
        self.inner.setup_storage()
    }

    fn storage_ready(&self) -> RepoResult<bool> {
        self.inner.storage_ready()
    }
}

fn partial_storage(_: &StorageSettings) -> Result<Arc<dyn Storage>, DriverError> {
    bind_driver(PartialDriver::new(PartialDriver::core_models(), false), None)
}

#[test]
fn builtin_sqlite_driver_loads_from_settings() {
    let dir = tempfile::tempdir().unwrap();
    let storage = DriverLoader::new()
        .load(&file_settings(dir.path()))
        .unwrap();

    assert_eq!(storage.driver_name(), "sqlite");
    let models = storage.models();
    assert_eq!(models.len(), 3);
    assert!(models.iter().any(ModelDescriptor::is::<User>));
}

#[test]
fn unknown_driver_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let settings = StorageSettings {
        driver: "postgres".to_string(),
        ..file_settings(dir.path())
    };

    let err = DriverLoader::new().load(&settings).err().unwrap();
    assert!(matches!(err, DriverError::NotFound(name) if name == "postgres"));
}

#[test]
fn builtin_registry_lists_sqlite() {
    let registry = DriverRegistry::builtin();
    assert_eq!(registry.names(), vec!["sqlite"]);
    assert!(registry.contains("sqlite"));
    assert!(!registry.contains("postgres"));
}

#[test]
fn external_driver_takes_precedence_over_builtin() {
    let dir = tempfile::tempdir().unwrap();
    let mut external = DriverRegistry::new();
    external.register("sqlite", partial_storage);

    let storage = DriverLoader::new()
        .with_external(external)
        .load(&file_settings(dir.path()))
        .unwrap();
    assert_eq!(storage.driver_name(), "partial");
}

#[test]
fn loader_falls_back_to_builtin_when_external_lacks_driver() {
    let dir = tempfile::tempdir().unwrap();
    let mut external = DriverRegistry::new();
    external.register("partial", partial_storage);

    let storage = DriverLoader::new()
        .with_external(external)
        .load(&file_settings(dir.path()))
        .unwrap();
    assert_eq!(storage.driver_name(), "sqlite");
}

#[test]
fn external_driver_failure_is_not_masked() {
    let dir = tempfile::tempdir().unwrap();
    let mut external = DriverRegistry::new();
    external.register("sqlite", |_: &StorageSettings| {
        Err(DriverError::MissingModel("User"))
    });

    let err = DriverLoader::new()
        .with_external(external)
        .load(&file_settings(dir.path()))
        .err()
        .unwrap();
    assert!(matches!(err, DriverError::MissingModel("User")));
}

#[test]
fn invalid_bcrypt_cost_fails_loading() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = file_settings(dir.path());
    settings.security.bcrypt_cost = 99;

    let err = DriverLoader::new().load(&settings).err().unwrap();
    assert!(matches!(err, DriverError::Storage(RepoError::Password(_))));
}

#[test]
fn driver_without_user_model_is_rejected() {
    let driver = PartialDriver::new(
        vec![ModelDescriptor::of::<Name>(), ModelDescriptor::of::<Role>()],
        false,
    );

    let err = default_bindings(&driver).err().unwrap();
    assert!(matches!(err, DriverError::MissingModel("User")));
    assert!(bind_driver(driver, None).is_err());
}

#[test]
fn extra_model_without_generic_repository_is_unsupported() {
    let mut models = PartialDriver::core_models();
    models.push(ModelDescriptor::of::<AuditEntry>());
    let driver = PartialDriver::new(models, false);

    let err = default_bindings(&driver).err().unwrap();
    assert!(matches!(err, DriverError::UnsupportedModel("AuditEntry")));
}

#[test]
fn extra_model_binds_to_generic_repository() {
    let mut models = PartialDriver::core_models();
    models.push(ModelDescriptor::of::<AuditEntry>());
    let driver = PartialDriver::new(models, true);

    let registry = default_bindings(&driver).unwrap();
    assert_eq!(registry.attribute_of::<AuditEntry>(), Some("audit_entry"));

    let uow = SqlUnitOfWork::new(open_db_in_memory().unwrap(), registry, test_hasher());
    let by_attribute = uow.repository::<AuditLog>("audit_entry").unwrap();
    let by_model = uow.repository_for::<AuditEntry, AuditLog>().unwrap();
    assert_eq!(by_attribute.label(), "audit");
    assert!(Rc::ptr_eq(&by_attribute, &by_model));
    assert!(uow.user().is_ok());
}

#[test]
fn seeding_without_first_admin_creates_only_roles() {
    let uow = memory_uow();
    seed_storage(&uow, None).unwrap();
    seed_storage(&uow, None).unwrap();

    let roles = uow.role().unwrap().get_multi(0, None).unwrap();
    let names: Vec<&str> = roles.iter().map(|role| role.name.as_str()).collect();
    let expected: Vec<&str> = REQUIRED_ROLES.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, expected);
    assert!(uow.user().unwrap().get_multi(0, None).unwrap().is_empty());
}

#[test]
fn seeding_creates_first_admin_once() {
    let uow = memory_uow();
    let admin = FirstAdminSettings {
        email: ADMIN_EMAIL.to_string(),
        password: "pw".to_string(),
    };
    seed_storage(&uow, Some(&admin)).unwrap();
    seed_storage(&uow, Some(&admin)).unwrap();

    let users = uow.user().unwrap().get_multi(0, None).unwrap();
    assert_eq!(users.len(), 1);
    assert!(users[0].is_admin);
    assert_eq!(users[0].roles.len(), REQUIRED_ROLES.len());
}
