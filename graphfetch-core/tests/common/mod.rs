//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use graphfetch_core::config::PaginationConfig;
use graphfetch_core::error::FetchError;
use graphfetch_core::query::{FieldSpec, QueryTemplate};
use graphfetch_core::rate_limiter::RateLimiter;
use graphfetch_core::retry::RetryPolicy;
use graphfetch_core::sparql::{QueryExecutor, SparqlResponse};
use graphfetch_core::{Fetcher, OffsetPipeline};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// A static dataset served page by page. Reads LIMIT and OFFSET from the
/// query text. With `stall_at` set, that call never returns and signals
/// [`PagedSource::stalled`] instead, standing in for a killed process.
pub struct PagedSource {
    items: Vec<(String, String)>,
    stall_at: Option<usize>,
    calls: AtomicUsize,
    stalled: Notify,
}

impl PagedSource {
    pub fn new(total: usize) -> Self {
        Self {
            items: (0..total)
                .map(|i| (format!("http://www.wikidata.org/entity/Q{i}"), format!("Painting {i}")))
                .collect(),
            stall_at: None,
            calls: AtomicUsize::new(0),
            stalled: Notify::new(),
        }
    }

    /// Hang on the `call`-th request (1-based).
    pub fn stalling_at(mut self, call: usize) -> Self {
        self.stall_at = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn stalled(&self) {
        self.stalled.notified().await;
    }
}

fn number_after(query: &str, word: &str) -> usize {
    query
        .split_whitespace()
        .skip_while(|w| *w != word)
        .nth(1)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl QueryExecutor for PagedSource {
    async fn execute(&self, query: &str) -> Result<SparqlResponse, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.stall_at == Some(call) {
            self.stalled.notify_one();
            std::future::pending::<()>().await;
        }

        let limit = number_after(query, "LIMIT");
        let offset = number_after(query, "OFFSET");
        let bindings: Vec<serde_json::Value> = self
            .items
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(item, label)| {
                serde_json::json!({
                    "item": {"type": "uri", "value": item},
                    "itemLabel": {"type": "literal", "value": label, "xml:lang": "en"},
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "head": {"vars": ["item", "itemLabel"]},
            "results": {"bindings": bindings}
        }))
        .map_err(|e| FetchError::Protocol {
            message: e.to_string(),
        })
    }

    fn endpoint(&self) -> &str {
        "memory://paintings"
    }
}

pub fn paintings_template() -> QueryTemplate {
    QueryTemplate::from_toml_str(
        r#"
name = "paintings"
version = 1
key = "item"
query = """
SELECT ?item ?itemLabel WHERE {{
  ?item wdt:P31 wd:Q3305213 .
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}
LIMIT {limit} OFFSET {offset}
"""

[[fields]]
name = "item"
required = true

[[fields]]
name = "itemLabel"
"#,
    )
    .unwrap()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        multiplier: 2.0,
        max_backoff: Duration::from_millis(100),
    }
}

pub fn fetcher(executor: Arc<dyn QueryExecutor>) -> Fetcher {
    Fetcher::new(executor, Arc::new(RateLimiter::unlimited()), fast_retry())
}

pub fn page_settings(limit: u64, checkpoint_interval: u64) -> PaginationConfig {
    PaginationConfig {
        limit,
        checkpoint_interval,
        max_batches_for_testing: 0,
        courtesy_delay_ms: 0,
    }
}

pub fn offset_pipeline(dir: &Path, source: Arc<PagedSource>, settings: PaginationConfig) -> OffsetPipeline {
    OffsetPipeline::new("paintings", paintings_template(), fetcher(source), dir, settings).unwrap()
}
