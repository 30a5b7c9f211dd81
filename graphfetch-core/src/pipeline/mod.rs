//! Pipeline drivers and the shared run vocabulary.
//!
//! Two drivers feed the same checkpoint store and finalizer:
//! - [`offset::OffsetPipeline`] pages sequentially through a query with
//!   `{limit}`/`{offset}` until the endpoint returns an empty page.
//! - [`batched::BatchedPipeline`] splits a known key set into batches and
//!   runs them on a bounded pool of tasks.

pub mod batched;
pub mod finalize;
pub mod offset;

pub use batched::BatchedPipeline;
pub use offset::OffsetPipeline;

use crate::checkpoint::{ResumeOrigin, RunMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Driver states. A run moves `Running` <-> `Checkpointing` until it is
/// `Exhausted`, then finalizes to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Running,
    Checkpointing,
    Exhausted,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Running => "running",
            PipelineState::Checkpointing => "checkpointing",
            PipelineState::Exhausted => "exhausted",
            PipelineState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Why a run stopped fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The endpoint returned no bindings.
    EmptyPage,
    /// A page exhausted its retries. Not an error; rows so far are kept.
    FetchFailed,
    /// `max_batches_for_testing` pages were fetched.
    TestingCap,
    /// Every pending batch was dispatched and collected.
    BatchesDrained,
    /// The final artifact already existed; nothing was fetched.
    AlreadyComplete,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::EmptyPage => "empty page",
            StopReason::FetchFailed => "fetch failed",
            StopReason::TestingCap => "testing cap reached",
            StopReason::BatchesDrained => "all batches processed",
            StopReason::AlreadyComplete => "already complete",
        };
        f.write_str(s)
    }
}

/// Summary of one driver run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    #[serde(serialize_with = "serialize_mode")]
    pub mode: RunMode,
    /// Rows in the final artifact.
    pub rows_written: usize,
    /// Pages (offset mode) or batches (batched mode) fetched successfully
    /// during this run.
    pub units_fetched: usize,
    /// Batches that exhausted their retries. Always zero in offset mode.
    pub units_failed: usize,
    pub checkpoints_written: usize,
    pub stop_reason: StopReason,
    pub final_path: PathBuf,
    #[serde(serialize_with = "serialize_origin")]
    pub resume_origin: ResumeOrigin,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

fn serialize_mode<S: serde::Serializer>(mode: &RunMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(match mode {
        RunMode::Paginated => "paginated",
        RunMode::Batched => "batched",
    })
}

fn serialize_origin<S: serde::Serializer>(origin: &ResumeOrigin, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(origin)
}

/// Log a state change with the run name attached.
pub(crate) fn transition(run: &str, from: &mut PipelineState, to: PipelineState) {
    let previous = *from;
    if previous != to {
        tracing::debug!(run, from = %previous, to = %to, "Pipeline state change");
        *from = to;
    }
}
