//! Storage driver binding and loading.
//!
//! # Responsibility
//! - Define the capability set every storage backend implements.
//! - Bind a driver to its default entity/repository registry and expose the
//!   result as an object-safe [`Storage`] bundle.
//! - Resolve a configured driver name, preferring externally supplied
//!   drivers over built-in ones.
//!
//! # Invariants
//! - A bound storage always has Name, Role and User repositories.
//! - Only `DriverError::NotFound` from the external registry falls back to
//!   the built-in one; every other error propagates.

use crate::model::name::Name;
use crate::model::role::{Role, RoleCreate};
use crate::model::user::{User, UserCreate};
use crate::model::{Entity, ModelDescriptor};
use crate::repo::name_repo::NameRepository;
use crate::repo::role_repo::RoleRepository;
use crate::repo::user_repo::UserRepository;
use crate::repo::{RepoError, RepoResult};
use crate::settings::{FirstAdminSettings, StorageSettings};
use crate::uow::{
    RegistryBuilder, RegistryError, RepoFactory, RepositoryRegistry, UnitOfWork, UnitOfWorkExt,
};
use log::{error, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

pub mod sqlite;

/// Roles every storage carries after setup, with their descriptions.
pub const REQUIRED_ROLES: &[(&str, &str)] = &[
    ("admin", "System administrator role."),
    ("user", "Standard user role."),
];

/// Driver loading and binding failure. Fatal at startup.
#[derive(Debug)]
pub enum DriverError {
    NotFound(String),
    MissingModel(&'static str),
    UnsupportedModel(&'static str),
    Registry(RegistryError),
    Storage(RepoError),
}

impl Display for DriverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "storage driver not found: {name}"),
            Self::MissingModel(entity) => {
                write!(f, "storage driver does not declare required model `{entity}`")
            }
            Self::UnsupportedModel(entity) => {
                write!(f, "storage driver has no repository for model `{entity}`")
            }
            Self::Registry(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::NotFound(_) | Self::MissingModel(_) | Self::UnsupportedModel(_) => None,
        }
    }
}

impl From<RegistryError> for DriverError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<RepoError> for DriverError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

/// Capability set of a storage backend.
///
/// `Context` is the per-unit-of-work state repositories are built from.
pub trait Driver: Send + Sync + 'static {
    type Context: 'static;

    fn name(&self) -> &'static str;

    /// Entity types this driver persists.
    fn models(&self) -> Vec<ModelDescriptor>;

    fn name_repository(context: &Rc<Self::Context>) -> Rc<dyn NameRepository>;

    fn role_repository(context: &Rc<Self::Context>) -> Rc<dyn RoleRepository>;

    fn user_repository(context: &Rc<Self::Context>) -> Rc<dyn UserRepository>;

    /// Repository factory for a model other than Name, Role and User.
    fn generic_repository(&self, _model: &ModelDescriptor) -> Option<RepoFactory<Self::Context>> {
        None
    }

    fn create_uow(
        &self,
        registry: &Arc<RepositoryRegistry<Self::Context>>,
    ) -> RepoResult<Box<dyn UnitOfWork>>;

    /// Prepares the store on every process start.
    fn init_storage(&self) -> RepoResult<()>;

    /// Creates the schema on first run.
    fn setup_storage(&self) -> RepoResult<()>;

    /// Checks the store is reachable; connectivity errors propagate.
    fn storage_ready(&self) -> RepoResult<bool>;
}

/// Lifecycle surface of a bound driver, shared across threads.
pub trait Storage: Send + Sync {
    fn driver_name(&self) -> &'static str;

    fn models(&self) -> Vec<ModelDescriptor>;

    fn create_uow(&self) -> RepoResult<Box<dyn UnitOfWork>>;

    fn init_storage(&self) -> RepoResult<()>;

    /// Creates the schema, then seeds required roles and the first
    /// administrator.
    fn setup_storage(&self) -> RepoResult<()>;

    fn storage_ready(&self) -> RepoResult<bool>;
}

/// Builds the default bindings: Name, Role and User to their specialized
/// repositories, any other model to the driver's generic repository.
pub fn default_bindings<D: Driver>(
    driver: &D,
) -> Result<Arc<RepositoryRegistry<D::Context>>, DriverError> {
    let models = driver.models();
    require_model::<Name>(&models)?;
    require_model::<Role>(&models)?;
    require_model::<User>(&models)?;

    let mut builder = RegistryBuilder::<D::Context>::new();
    for model in models {
        if model.is::<Name>() {
            builder.register::<Name, dyn NameRepository, _>(None, D::name_repository)?;
        } else if model.is::<Role>() {
            builder.register::<Role, dyn RoleRepository, _>(None, D::role_repository)?;
        } else if model.is::<User>() {
            builder.register::<User, dyn UserRepository, _>(None, D::user_repository)?;
        } else {
            let factory = driver
                .generic_repository(&model)
                .ok_or(DriverError::UnsupportedModel(model.entity()))?;
            builder.register_model(model, None, factory)?;
        }
    }
    Ok(builder.build())
}

fn require_model<E: Entity>(models: &[ModelDescriptor]) -> Result<(), DriverError> {
    if models.iter().any(ModelDescriptor::is::<E>) {
        Ok(())
    } else {
        Err(DriverError::MissingModel(E::ENTITY))
    }
}

/// Binds `driver` to its default bindings.
///
/// `first_admin` is the account seeded by `setup_storage`.
pub fn bind_driver<D: Driver>(
    driver: D,
    first_admin: Option<FirstAdminSettings>,
) -> Result<Arc<dyn Storage>, DriverError> {
    let registry = default_bindings(&driver)?;
    Ok(Arc::new(BoundStorage {
        driver,
        registry,
        first_admin,
    }))
}

struct BoundStorage<D: Driver> {
    driver: D,
    registry: Arc<RepositoryRegistry<D::Context>>,
    first_admin: Option<FirstAdminSettings>,
}

impl<D: Driver> Storage for BoundStorage<D> {
    fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    fn models(&self) -> Vec<ModelDescriptor> {
        self.registry.models()
    }

    fn create_uow(&self) -> RepoResult<Box<dyn UnitOfWork>> {
        self.driver.create_uow(&self.registry)
    }

    fn init_storage(&self) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.driver.init_storage();
        log_lifecycle("storage_init", self.driver.name(), started_at, &result);
        result
    }

    fn setup_storage(&self) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.driver.setup_storage().and_then(|()| {
            let uow = self.driver.create_uow(&self.registry)?;
            seed_storage(uow.as_ref(), self.first_admin.as_ref())
        });
        log_lifecycle("storage_setup", self.driver.name(), started_at, &result);
        result
    }

    fn storage_ready(&self) -> RepoResult<bool> {
        let started_at = Instant::now();
        let result = self.driver.storage_ready();
        log_lifecycle("storage_ready", self.driver.name(), started_at, &result);
        result
    }
}

fn log_lifecycle<T>(event: &str, driver: &str, started_at: Instant, result: &RepoResult<T>) {
    match result {
        Ok(_) => info!(
            "event={event} module=driver status=ok driver={driver} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event={event} module=driver status=error driver={driver} duration_ms={} error={err}",
            started_at.elapsed().as_millis()
        ),
    }
}

/// Creates the required roles and the first administrator when absent.
///
/// Runs in one scope; calling it again changes nothing.
pub fn seed_storage(
    uow: &dyn UnitOfWork,
    first_admin: Option<&FirstAdminSettings>,
) -> RepoResult<()> {
    uow.scope(|uow| -> RepoResult<()> {
        let roles = uow.role()?;
        for (name, description) in REQUIRED_ROLES {
            if roles.get_by_name(name)?.is_none() {
                roles.create(RoleCreate::new(*name, Some(*description)))?;
            }
        }

        if let Some(admin) = first_admin {
            let users = uow.user()?;
            if users.get_by_email(&admin.email)?.is_none() {
                users.create(UserCreate {
                    is_superuser: true,
                    is_admin: true,
                    roles: REQUIRED_ROLES
                        .iter()
                        .map(|(name, _)| (*name).to_string())
                        .collect(),
                    ..UserCreate::new(admin.email.as_str(), admin.password.as_str())
                })?;
            }
        }
        Ok(())
    })
}

/// Constructor turning settings into a bound storage.
pub type DriverConstructor =
    Arc<dyn Fn(&StorageSettings) -> Result<Arc<dyn Storage>, DriverError> + Send + Sync>;

/// Name to constructor table of loadable drivers.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, DriverConstructor>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drivers shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(sqlite::SqliteDriver::NAME, sqlite::SqliteDriver::from_settings);
        registry
    }

    /// Adds or replaces the driver named `name`.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&StorageSettings) -> Result<Arc<dyn Storage>, DriverError> + Send + Sync + 'static,
    {
        self.drivers.insert(name.to_string(), Arc::new(constructor));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Constructs the driver named by `settings.driver`.
    pub fn load(&self, settings: &StorageSettings) -> Result<Arc<dyn Storage>, DriverError> {
        let constructor = self
            .drivers
            .get(settings.driver.as_str())
            .ok_or_else(|| DriverError::NotFound(settings.driver.clone()))?;
        constructor(settings)
    }
}

/// Resolves the configured driver once at startup.
pub struct DriverLoader {
    external: Option<DriverRegistry>,
    builtin: DriverRegistry,
}

impl Default for DriverLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverLoader {
    /// Loader over the built-in drivers only.
    pub fn new() -> Self {
        Self {
            external: None,
            builtin: DriverRegistry::builtin(),
        }
    }

    /// Consults `external` before the built-in drivers.
    pub fn with_external(mut self, external: DriverRegistry) -> Self {
        self.external = Some(external);
        self
    }

    pub fn load(&self, settings: &StorageSettings) -> Result<Arc<dyn Storage>, DriverError> {
        let started_at = Instant::now();
        if let Some(external) = &self.external {
            match external.load(settings) {
                Ok(storage) => {
                    log_driver_load("external", settings, started_at, None);
                    return Ok(storage);
                }
                Err(DriverError::NotFound(_)) => {}
                Err(err) => {
                    log_driver_load("external", settings, started_at, Some(&err));
                    return Err(err);
                }
            }
        }

        match self.builtin.load(settings) {
            Ok(storage) => {
                log_driver_load("builtin", settings, started_at, None);
                Ok(storage)
            }
            Err(err) => {
                log_driver_load("builtin", settings, started_at, Some(&err));
                Err(err)
            }
        }
    }
}

fn log_driver_load(
    source: &str,
    settings: &StorageSettings,
    started_at: Instant,
    failure: Option<&DriverError>,
) {
    match failure {
        None => info!(
            "event=driver_load module=driver status=ok source={source} driver={} duration_ms={}",
            settings.driver,
            started_at.elapsed().as_millis()
        ),
        Some(err) => error!(
            "event=driver_load module=driver status=error source={source} driver={} duration_ms={} error={err}",
            settings.driver,
            started_at.elapsed().as_millis()
        ),
    }
}

/// Loads the configured driver from the built-in registry.
pub fn load_storage(settings: &StorageSettings) -> Result<Arc<dyn Storage>, DriverError> {
    DriverLoader::new().load(settings)
}
