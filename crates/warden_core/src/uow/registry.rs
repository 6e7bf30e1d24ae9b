//! Entity to repository bindings.
//!
//! # Responsibility
//! - Collect entity/repository bindings once at startup.
//! - Freeze them into an immutable registry shared by every unit of work.
//! - Memoize constructed repositories per unit-of-work instance.
//!
//! # Invariants
//! - One binding per entity type and per attribute name.
//! - Attribute names are identifiers and never shadow unit-of-work methods.

use crate::model::name::Name;
use crate::model::role::Role;
use crate::model::user::User;
use crate::model::{Entity, ModelDescriptor};
use crate::naming::{camel_to_snake, is_identifier};
use crate::repo::{RepoError, RepoResult};
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::sync::Arc;

/// Attribute names taken by the unit-of-work surface itself.
pub const RESERVED_ATTRIBUTES: &[&str] = &[
    "commit",
    "rollback",
    "close",
    "depth",
    "scope",
    "scope_depth",
    "resolve",
    "repository",
    "repository_for",
];

/// Attribute names shared with the typed accessors `name()`, `role()` and
/// `user()`; only the accessor's own entity may bind them.
fn accessor_entity(attribute: &str) -> Option<ModelDescriptor> {
    match attribute {
        "name" => Some(ModelDescriptor::of::<Name>()),
        "role" => Some(ModelDescriptor::of::<Role>()),
        "user" => Some(ModelDescriptor::of::<User>()),
        _ => None,
    }
}

/// Type-erased repository constructor over a driver context `C`.
///
/// The produced value is an `Rc<H>` boxed as `Rc<dyn Any>`, where `H` is the
/// handler type given at registration.
pub type RepoFactory<C> = Arc<dyn Fn(&Rc<C>) -> Rc<dyn Any> + Send + Sync>;

/// Startup-fatal registration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyRegistered(&'static str),
    AttributeTaken(String),
    InvalidAttribute(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRegistered(entity) => write!(f, "entity `{entity}` is already registered"),
            Self::AttributeTaken(name) => write!(f, "attribute `{name}` is already taken"),
            Self::InvalidAttribute(name) => write!(f, "`{name}` is not a valid attribute name"),
        }
    }
}

impl Error for RegistryError {}

/// Lookup key for a bound repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKey<'a> {
    Attribute(&'a str),
    Model(ModelDescriptor),
}

impl Display for RepositoryKey<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attribute(name) => write!(f, "{name}"),
            Self::Model(model) => write!(f, "{}", model.entity()),
        }
    }
}

struct Binding<C> {
    model: ModelDescriptor,
    attribute: String,
    factory: RepoFactory<C>,
}

/// Mutable collection phase of the registry.
pub struct RegistryBuilder<C> {
    bindings: Vec<Binding<C>>,
}

impl<C: 'static> Default for RegistryBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> RegistryBuilder<C> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Binds entity `E` to a repository of handler type `H`.
    ///
    /// `attribute` defaults to the snake_case entity name.
    pub fn register<E, H, F>(
        &mut self,
        attribute: Option<&str>,
        factory: F,
    ) -> Result<&mut Self, RegistryError>
    where
        E: Entity,
        H: ?Sized + 'static,
        F: Fn(&Rc<C>) -> Rc<H> + Send + Sync + 'static,
    {
        let erased: RepoFactory<C> =
            Arc::new(move |context: &Rc<C>| Rc::new(factory(context)) as Rc<dyn Any>);
        self.register_model(ModelDescriptor::of::<E>(), attribute, erased)
    }

    /// Binds a model known only through its descriptor.
    pub fn register_model(
        &mut self,
        model: ModelDescriptor,
        attribute: Option<&str>,
        factory: RepoFactory<C>,
    ) -> Result<&mut Self, RegistryError> {
        if self
            .bindings
            .iter()
            .any(|binding| binding.model.type_id() == model.type_id())
        {
            log::error!(
                "event=repo_register module=uow status=error entity={} error_code=already_registered",
                model.entity()
            );
            return Err(RegistryError::AlreadyRegistered(model.entity()));
        }

        let attribute = match attribute {
            Some(name) => name.to_string(),
            None => camel_to_snake(model.entity()),
        };
        if !is_identifier(&attribute) {
            return Err(RegistryError::InvalidAttribute(attribute));
        }
        if RESERVED_ATTRIBUTES.contains(&attribute.as_str())
            || accessor_entity(&attribute).is_some_and(|owner| owner != model)
            || self
                .bindings
                .iter()
                .any(|binding| binding.attribute == attribute)
        {
            log::error!(
                "event=repo_register module=uow status=error entity={} attribute={} error_code=attribute_taken",
                model.entity(),
                attribute
            );
            return Err(RegistryError::AttributeTaken(attribute));
        }

        log::debug!(
            "event=repo_register module=uow status=ok entity={} attribute={}",
            model.entity(),
            attribute
        );
        self.bindings.push(Binding {
            model,
            attribute,
            factory,
        });
        Ok(self)
    }

    /// Freezes the bindings.
    pub fn build(self) -> Arc<RepositoryRegistry<C>> {
        Arc::new(RepositoryRegistry {
            bindings: self.bindings,
        })
    }
}

/// Immutable entity/repository bindings shared across units of work.
pub struct RepositoryRegistry<C> {
    bindings: Vec<Binding<C>>,
}

impl<C: 'static> RepositoryRegistry<C> {
    /// Bound attribute names in registration order.
    pub fn attributes(&self) -> Vec<&str> {
        self.bindings
            .iter()
            .map(|binding| binding.attribute.as_str())
            .collect()
    }

    pub fn models(&self) -> Vec<ModelDescriptor> {
        self.bindings.iter().map(|binding| binding.model).collect()
    }

    /// Attribute name bound to entity `E`, if any.
    pub fn attribute_of<E: Entity>(&self) -> Option<&str> {
        self.find(RepositoryKey::Model(ModelDescriptor::of::<E>()))
            .map(|binding| binding.attribute.as_str())
    }

    pub fn contains(&self, key: RepositoryKey<'_>) -> bool {
        self.find(key).is_some()
    }

    fn find(&self, key: RepositoryKey<'_>) -> Option<&Binding<C>> {
        self.bindings.iter().find(|binding| match key {
            RepositoryKey::Attribute(name) => binding.attribute == name,
            RepositoryKey::Model(model) => binding.model.type_id() == model.type_id(),
        })
    }
}

/// Per-instance memo of constructed repositories, keyed by attribute.
#[derive(Default)]
pub struct RepositorySlots {
    slots: RefCell<BTreeMap<String, Rc<dyn Any>>>,
}

impl RepositorySlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached repository for `key`, constructing it on first use.
    pub fn resolve<C: 'static>(
        &self,
        registry: &RepositoryRegistry<C>,
        context: &Rc<C>,
        key: RepositoryKey<'_>,
    ) -> RepoResult<Rc<dyn Any>> {
        let binding = registry
            .find(key)
            .ok_or_else(|| RepoError::UnboundRepository(key.to_string()))?;

        if let Some(cached) = self.slots.borrow().get(&binding.attribute) {
            return Ok(Rc::clone(cached));
        }

        let repository = (binding.factory)(context);
        self.slots
            .borrow_mut()
            .insert(binding.attribute.clone(), Rc::clone(&repository));
        Ok(repository)
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Drops every cached repository.
    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
    }
}

/// Recovers the handler type of a resolved repository.
pub fn downcast_repository<H: ?Sized + 'static>(
    repository: Rc<dyn Any>,
    key: RepositoryKey<'_>,
) -> RepoResult<Rc<H>> {
    repository
        .downcast::<Rc<H>>()
        .map(|handler| Rc::clone(handler.as_ref()))
        .map_err(|_| RepoError::RepositoryType(key.to_string()))
}
