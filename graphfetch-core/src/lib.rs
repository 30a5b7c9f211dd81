//! # Graphfetch Core
//!
//! Core library for graphfetch, a resumable harvester for SPARQL endpoints.
//! Provides the query templates, SPARQL client, rate limiter, retrying
//! fetcher, checkpoint store, pipeline drivers, finalizer and configuration.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod keys;
pub mod persistence;
pub mod pipeline;
pub mod query;
pub mod rate_limiter;
pub mod retry;
pub mod sparql;
pub mod table;

// Re-export commonly used types at the crate root.
pub use checkpoint::{CheckpointStatus, CheckpointStore, Cursor, ResumeOrigin, RunMode};
pub use config::{HarvestConfig, load_config};
pub use error::{
    CheckpointError, ConfigError, FetchError, HarvestError, Result, TableError, TemplateError,
};
pub use fetcher::{FetchOutcome, Fetcher};
pub use keys::{Batch, KeySet};
pub use pipeline::{BatchedPipeline, OffsetPipeline, PipelineState, RunReport, StopReason};
pub use query::{FieldSpec, QueryTemplate, ResultSchema};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use sparql::{QueryExecutor, SparqlClient, SparqlResponse};
pub use table::{Record, Table};
