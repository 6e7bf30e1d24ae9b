use crate::model::name::{Name, NameCreate, NameUpdate};
use crate::repo::{RepoResult, Repository};

/// Name lookups layered on the generic repository.
pub trait NameRepository: Repository<Entity = Name, Create = NameCreate, Update = NameUpdate> {
    /// Names with this exact last name, ordered by first name.
    fn get_by_last(&self, last: &str) -> RepoResult<Vec<Name>>;

    /// Names with this exact first name, ordered by last name.
    fn get_by_first(&self, first: &str) -> RepoResult<Vec<Name>>;

    /// Names matching both parts exactly.
    fn get_by_full(&self, first: &str, last: &str) -> RepoResult<Vec<Name>>;
}
