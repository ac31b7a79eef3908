//! Error taxonomy for the engines and the storage layer.

use thiserror::Error;

/// Failures raised by the user repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no user stored under id {0}")]
    NotFound(String),
    #[error("id or username is already registered: {0}")]
    AlreadyExists(String),
    #[error("stale write for {id}: stored version no longer matches {expected}")]
    Conflict { id: String, expected: u64 },
    #[error("failed to decode stored aggregate {id}: {reason}")]
    Codec { id: String, reason: String },
    #[error(transparent)]
    Io(#[from] sled::Error),
}

/// Failures surfaced by the friendship and trade engines.
///
/// Precondition violations (`InvalidTarget`, `AlreadyFriends`,
/// `DuplicateRequest`, `CardNotOwned`, `CardNotTradeable`) are returned
/// before anything is written. `Conflict` only appears once the internal
/// retry budget is spent. `PartialFailure` means a two-write commit landed
/// half way and could not be compensated; it is never retried here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("user {0} does not exist")]
    UserNotFound(String),
    #[error("card {0} does not exist")]
    CardNotFound(String),
    #[error("no pending friend request between {current} and {counterpart}")]
    RequestNotFound { current: String, counterpart: String },
    #[error("trade offer {0} is no longer open")]
    OfferNotFound(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("users {0} and {1} are already friends")]
    AlreadyFriends(String, String),
    #[error("a friend request between {0} and {1} is already pending")]
    DuplicateRequest(String, String),
    #[error("card {card} is not owned by {expected_owner}")]
    CardNotOwned { card: String, expected_owner: String },
    #[error("card {0} is not open for trading")]
    CardNotTradeable(String),
    #[error("ownership of card {card} changed since the offer was created")]
    OwnershipChanged { card: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("codec failure: {0}")]
    Codec(String),
    #[error("conflicting writes on {id} persisted after retries were exhausted")]
    Conflict { id: String },
    #[error("partial failure: aggregate {id} may be inconsistent ({reason})")]
    PartialFailure { id: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True for optimistic-concurrency collisions, whether raised by the
    /// store or already promoted to the engine-level variant.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::Conflict { .. } | EngineError::Store(StoreError::Conflict { .. })
        )
    }

    /// Promote a store-level conflict to the caller-facing variant once the
    /// retry budget is spent. Every other error passes through unchanged.
    pub(crate) fn into_exhausted_conflict(self) -> Self {
        match self {
            EngineError::Store(StoreError::Conflict { id, .. }) => EngineError::Conflict { id },
            other => other,
        }
    }
}
