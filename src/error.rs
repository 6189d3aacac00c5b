use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the wallpaper store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert refused because the ID is taken and the policy is `Reject`
    #[error("wallpaper {id} already exists (stored at {existing})")]
    DuplicateId { id: String, existing: PathBuf },

    #[error("no wallpaper matches '{0}'")]
    NotFound(String),

    /// A prefix lookup matched more than one record
    #[error("'{query}' is ambiguous ({matches} wallpapers match)")]
    Ambiguous { query: String, matches: usize },

    #[error("tag name must not be empty")]
    EmptyTag,
}

/// Errors raised while turning a scope into a candidate list
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("tag '{0}' does not exist")]
    UnknownTag(String),

    #[error("folder {} is not a configured library folder", .0.display())]
    UnknownFolder(PathBuf),
}
