//! Error types for the persistence collaborator.

/// Errors returned by a [`Repository`](crate::Repository).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record the caller relied on does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Optimistic concurrency check failed: someone else saved first.
    #[error("revision conflict on {kind} {id}: expected {expected}, found {found}")]
    Conflict {
        kind: &'static str,
        id: String,
        expected: u64,
        found: u64,
    },

    /// A record with the same key already exists.
    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    /// The backend failed in a way the caller cannot act on.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` for optimistic concurrency failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
