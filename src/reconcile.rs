//! Two-write reconciliation for operations spanning a pair of aggregates.
//!
//! The repository only guarantees single-document atomicity, so an operation
//! touching two users must read both, compute both new states locally, then
//! write them back one at a time. Writes always go out in ascending id order
//! with optimistic-concurrency checks on each. When the second write cannot
//! land, the first one is rolled back to its prior state; only a failed
//! rollback leaves real inconsistency, which is surfaced as `PartialFailure`
//! and never retried.

use std::time::Duration;
use tracing::{error, warn};

use crate::error::EngineError;
use crate::store::UserStore;
use crate::user::User;

/// Bounded retry with exponential backoff for optimistic-concurrency
/// conflicts. Attempts beyond the budget surface `EngineError::Conflict`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(1u32 << attempt.min(6))
    }
}

/// One precomputed aggregate write: the next state, the version it was
/// computed from, and the prior state kept around for compensation.
#[derive(Debug)]
pub struct PreparedWrite {
    pub next: User,
    pub expected: u64,
    pub prior: User,
}

impl PreparedWrite {
    pub fn new(next: User, expected: u64, prior: User) -> Self {
        Self {
            next,
            expected,
            prior,
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-conflict error, or the
/// retry budget is spent. `op` must re-read its aggregates on every call so
/// a retry starts from fresh state.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    mut op: impl FnMut() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(err) if err.is_conflict() => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(err.into_exhausted_conflict());
                }
                warn!(attempt, "conflicting write detected, retrying from fresh reads");
                std::thread::sleep(policy.backoff(attempt));
            }
            other => return other,
        }
    }
}

/// Commits two prepared aggregates, lower id first. Returns the updated
/// aggregates in the order they were passed in.
///
/// A conflict on the first write propagates untouched (nothing persisted
/// yet). A failure on the second write rolls the first aggregate back to its
/// prior state before reporting, so callers can retry the whole operation
/// from fresh reads. A rollback failure is the one unrecoverable outcome.
pub fn commit_pair(
    store: &UserStore,
    first: PreparedWrite,
    second: PreparedWrite,
) -> Result<(User, User), EngineError> {
    let flipped = first.next.id > second.next.id;
    let (lo, hi) = if flipped {
        (second, first)
    } else {
        (first, second)
    };

    let lo_version = store.update(&lo.next, lo.expected)?;

    match store.update(&hi.next, hi.expected) {
        Ok(_) => {
            let (a, b) = if flipped {
                (hi.next, lo.next)
            } else {
                (lo.next, hi.next)
            };
            Ok((a, b))
        }
        Err(err) => {
            warn!(
                aggregate = %hi.next.id,
                %err,
                "second write failed, rolling back first write"
            );
            match store.update(&lo.prior, lo_version) {
                Ok(_) => Err(EngineError::Store(err)),
                Err(rollback_err) => {
                    error!(
                        aggregate = %lo.next.id,
                        %rollback_err,
                        "rollback failed after half-applied two-write commit"
                    );
                    Err(EngineError::PartialFailure {
                        id: lo.next.id.clone(),
                        reason: rollback_err.to_string(),
                    })
                }
            }
        }
    }
}
