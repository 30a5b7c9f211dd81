//! Single-query execution: rate limit, retry, and schema projection.

use crate::query::ResultSchema;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryPolicy, with_retry};
use crate::sparql::QueryExecutor;
use crate::table::Record;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a fetch produced.
///
/// An empty `Success` is the endpoint saying "no more data"; `Failure`
/// means every attempt was spent and carries the reason for the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Vec<Record>),
    Failure(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

/// Executes queries through a shared rate limiter with bounded retry.
///
/// Cheap to clone; clones share the executor and the limiter window.
#[derive(Clone)]
pub struct Fetcher {
    executor: Arc<dyn QueryExecutor>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            executor,
            limiter,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `query` and project the bindings onto `schema`.
    ///
    /// Every attempt, including retries, passes through the rate limiter.
    pub async fn fetch(&self, query: &str, schema: &ResultSchema) -> FetchOutcome {
        let executor = self.executor.as_ref();
        let limiter = self.limiter.as_ref();

        let result = with_retry(&self.policy, move || async move {
            limiter.acquire().await;
            let response = executor.execute(query).await?;
            schema.project_all(response.bindings())
        })
        .await;

        match result {
            Ok(rows) => {
                debug!(rows = rows.len(), schema = %schema.name, "Query succeeded");
                FetchOutcome::Success(rows)
            }
            Err(failure) => {
                warn!(
                    endpoint = %self.executor.endpoint(),
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Max retries exceeded"
                );
                FetchOutcome::Failure(failure.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("endpoint", &self.executor.endpoint())
            .field("policy", &self.policy)
            .finish()
    }
}
