//! Optimistic-concurrency save loop
//!
//! Apply a mutation, save, and on a version conflict reload and start over
//! with the fresh aggregate. Other errors are returned immediately.
//!
//! **Backoff Strategy:**
//! - Initial delay: 10ms
//! - Max delay: 1000ms
//! - Multiplier: 2.0 (exponential)

use cdb_common::config::ImportConfig;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::aggregate::{Aggregate, Repository, RepositoryError};

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Gave up saving {kind} {id} after {attempts} conflicting attempts")]
    RetriesExhausted {
        kind: cdb_common::AggregateKind,
        id: cdb_common::ExternalId,
        attempts: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            initial_backoff_ms: 10,
            max_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            max_attempts: config.save_max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Retry immediately, for tests
    pub fn without_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }
}

/// Apply `mutate` to `aggregate` and save it, retrying on conflict
///
/// On every retry the aggregate is reloaded and `mutate` runs again against
/// the reloaded version, so the saved state is the mutation applied to
/// whatever was current at that time. Returns the saved aggregate.
pub async fn save_with_retry<R, F>(
    repo: &R,
    mut aggregate: Aggregate,
    mut mutate: F,
    policy: &RetryPolicy,
) -> Result<Aggregate, SaveError>
where
    R: Repository + ?Sized,
    F: FnMut(&mut Aggregate),
{
    let start_time = Instant::now();
    let mut backoff_ms = policy.initial_backoff_ms;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        mutate(&mut aggregate);

        match repo.save(&mut aggregate).await {
            Ok(()) => {
                if attempt > 1 {
                    tracing::debug!(
                        kind = %aggregate.kind(),
                        id = %aggregate.id(),
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Save succeeded after retry"
                    );
                }
                return Ok(aggregate);
            }
            Err(RepositoryError::Conflict { kind, id, expected_version }) => {
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        kind = %kind,
                        id = %id,
                        attempts = attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Save kept conflicting, giving up"
                    );
                    return Err(SaveError::RetriesExhausted { kind, id, attempts: attempt });
                }

                tracing::warn!(
                    kind = %kind,
                    id = %id,
                    attempt,
                    expected_version,
                    backoff_ms,
                    "Concurrent modification, reloading and retrying"
                );

                if backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                backoff_ms = (backoff_ms * 2).min(policy.max_backoff_ms);

                aggregate = repo.load(&id).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
