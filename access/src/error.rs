use thiserror::Error;

/// Errors raised by access-policy writes (§4.8, §7).
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("mode=add write would not be a superset of the previous grant's persons/groups")]
    NotMonotonic,
}
