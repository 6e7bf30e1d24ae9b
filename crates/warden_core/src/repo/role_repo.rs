use crate::model::role::{Role, RoleCreate, RoleUpdate};
use crate::repo::{RepoResult, Repository};

/// Role lookups layered on the generic repository.
pub trait RoleRepository: Repository<Entity = Role, Create = RoleCreate, Update = RoleUpdate> {
    /// Case-insensitive exact match on the role name.
    fn get_by_name(&self, name: &str) -> RepoResult<Option<Role>>;
}
