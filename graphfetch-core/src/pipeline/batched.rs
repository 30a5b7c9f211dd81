//! Key-batched supplement runs on a bounded task pool.
//!
//! Every pending batch gets its own task, gated by a semaphore of
//! `max_workers` permits. Results are collected from a `JoinSet` in
//! completion order; only this collecting loop touches the table and the
//! completed set, so no lock is needed around them.

use super::finalize::finalize_batched;
use super::{PipelineState, RunReport, StopReason, transition};
use crate::checkpoint::{CheckpointStore, Cursor, ResumeOrigin, RunMode};
use crate::config::BatchedConfig;
use crate::error::{HarvestError, TemplateError};
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::keys::KeySet;
use crate::query::{QID_LIST, QueryTemplate, ResultSchema, SRC_COLUMN_NAME};
use crate::table::Table;
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Fetches supplemental rows for every key of a [`KeySet`].
#[derive(Debug)]
pub struct BatchedPipeline {
    template: QueryTemplate,
    schema: Arc<ResultSchema>,
    fetcher: Fetcher,
    keys: KeySet,
    store: CheckpointStore,
    settings: BatchedConfig,
}

impl BatchedPipeline {
    pub fn new(
        name: &str,
        template: QueryTemplate,
        fetcher: Fetcher,
        keys: KeySet,
        target_dir: &Path,
        settings: BatchedConfig,
    ) -> Result<Self, TemplateError> {
        let placeholders = template.placeholders()?;
        if !placeholders.iter().any(|p| p == QID_LIST) {
            return Err(TemplateError::Parse {
                message: format!(
                    "template '{}' must contain {{{QID_LIST}}} for batching",
                    template.name
                ),
            });
        }
        if let Some(other) = placeholders
            .iter()
            .find(|p| *p != QID_LIST && *p != SRC_COLUMN_NAME)
        {
            return Err(TemplateError::UnknownPlaceholder {
                template: template.name.clone(),
                name: other.clone(),
            });
        }
        // Rows are joined back on the key column, so the query must return it.
        template.require_field(keys.column())?;

        Ok(Self {
            schema: Arc::new(template.schema()),
            store: CheckpointStore::batched(name, target_dir, &settings.output_prefix),
            template,
            fetcher,
            keys,
            settings,
        })
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub async fn run(&self) -> Result<RunReport, HarvestError> {
        let started_at = Utc::now();
        let run = self.store.name();
        let final_path = self.store.final_path();

        if final_path.exists() {
            let rows = Table::read_csv(&final_path)?.len();
            info!(run, path = %final_path.display(), "Supplement already exists, skipping");
            return Ok(RunReport {
                name: run.to_string(),
                mode: RunMode::Batched,
                rows_written: rows,
                units_fetched: 0,
                units_failed: 0,
                checkpoints_written: 0,
                stop_reason: StopReason::AlreadyComplete,
                final_path,
                resume_origin: ResumeOrigin::FinalArtifact,
                started_at,
                finished_at: Utc::now(),
            });
        }

        let resume = self.store.load()?;
        let mut table = resume.table;
        let mut done = match resume.cursor {
            Cursor::Batches(done) => done,
            Cursor::Offset(_) => BTreeSet::new(),
        };

        let batches = self.keys.batches(self.settings.batch_size);
        let total = batches.len();
        let pending: Vec<_> = batches
            .into_iter()
            .filter(|b| !done.contains(&b.index))
            .collect();
        info!(
            run,
            keys = self.keys.len(),
            batches = total,
            pending = pending.len(),
            origin = %resume.origin,
            "Starting batched run"
        );

        let mut state = PipelineState::Running;
        let semaphore = Arc::new(Semaphore::new(self.settings.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for batch in pending {
            let query = self.template.render_batch(
                &batch.ids(),
                &self.settings.id_prefix,
                self.keys.column(),
            )?;
            let semaphore = Arc::clone(&semaphore);
            let fetcher = self.fetcher.clone();
            let schema = Arc::clone(&self.schema);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (batch.index, FetchOutcome::Failure("worker pool closed".into()));
                };
                debug!(batch = batch.index, keys = batch.len(), "Fetching batch");
                let outcome = fetcher.fetch(&query, &schema).await;
                (batch.index, outcome)
            });
        }

        let frequency = self.settings.checkpoint_frequency.max(1);
        let mut completed = 0usize;
        let mut fetched = 0usize;
        let mut failed = 0usize;
        let mut checkpoints = 0usize;

        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            match joined {
                Ok((index, FetchOutcome::Success(rows))) => {
                    debug!(run, batch = index, rows = rows.len(), "Batch complete");
                    table.extend(rows);
                    done.insert(index);
                    fetched += 1;
                }
                Ok((index, FetchOutcome::Failure(reason))) => {
                    warn!(run, batch = index, %reason, "Batch failed, continuing");
                    failed += 1;
                }
                Err(e) => {
                    error!(run, error = %e, "Batch task did not complete");
                    failed += 1;
                }
            }

            if completed % frequency == 0 {
                transition(run, &mut state, PipelineState::Checkpointing);
                self.store.save(&table, &Cursor::Batches(done.clone()))?;
                checkpoints += 1;
                info!(
                    run,
                    completed,
                    done = done.len(),
                    total,
                    rows = table.len(),
                    "Checkpoint saved"
                );
                transition(run, &mut state, PipelineState::Running);
            }
        }
        transition(run, &mut state, PipelineState::Exhausted);

        if failed > 0 {
            warn!(run, failed, "Some batches failed; their keys will have empty columns");
        }

        let finalized = finalize_batched(&self.store, table, &self.keys)?;
        transition(run, &mut state, PipelineState::Done);

        Ok(RunReport {
            name: run.to_string(),
            mode: RunMode::Batched,
            rows_written: finalized.rows,
            units_fetched: fetched,
            units_failed: failed,
            checkpoints_written: checkpoints,
            stop_reason: StopReason::BatchesDrained,
            final_path: finalized.path,
            resume_origin: resume.origin,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
