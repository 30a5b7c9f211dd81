//! Sequential LIMIT/OFFSET paging.

use super::finalize::finalize_paginated;
use super::{PipelineState, RunReport, StopReason, transition};
use crate::checkpoint::{CheckpointStore, Cursor, RunMode};
use crate::config::PaginationConfig;
use crate::error::{HarvestError, TemplateError};
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::query::{LIMIT, OFFSET, QueryTemplate, ResultSchema};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pages through one query until the endpoint runs dry.
#[derive(Debug)]
pub struct OffsetPipeline {
    template: QueryTemplate,
    schema: ResultSchema,
    fetcher: Fetcher,
    store: CheckpointStore,
    settings: PaginationConfig,
}

impl OffsetPipeline {
    /// The template must contain both `{limit}` and `{offset}` and nothing
    /// else.
    pub fn new(
        name: &str,
        template: QueryTemplate,
        fetcher: Fetcher,
        target_dir: &Path,
        settings: PaginationConfig,
    ) -> Result<Self, TemplateError> {
        let placeholders = template.placeholders()?;
        for required in [LIMIT, OFFSET] {
            if !placeholders.iter().any(|p| p == required) {
                return Err(TemplateError::Parse {
                    message: format!(
                        "template '{}' must contain {{{required}}} for paging",
                        template.name
                    ),
                });
            }
        }
        if let Some(other) = placeholders.iter().find(|p| *p != LIMIT && *p != OFFSET) {
            return Err(TemplateError::UnknownPlaceholder {
                template: template.name.clone(),
                name: other.clone(),
            });
        }

        Ok(Self {
            schema: template.schema(),
            template,
            fetcher,
            store: CheckpointStore::paginated(name, target_dir),
            settings,
        })
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub async fn run(&self) -> Result<RunReport, HarvestError> {
        let started_at = Utc::now();
        let run = self.store.name();
        let limit = self.settings.limit.max(1);
        let interval = self.settings.checkpoint_interval.max(1);
        let cap = self.settings.max_batches_for_testing;
        let courtesy = Duration::from_millis(self.settings.courtesy_delay_ms);

        let resume = self.store.load()?;
        let mut table = resume.table;
        let mut offset = resume.cursor.offset().unwrap_or(0);
        let mut batch_number = offset / limit;
        let mut pages = 0usize;
        let mut checkpoints = 0usize;
        let mut state = PipelineState::Running;

        info!(run, offset, rows = table.len(), origin = %resume.origin, "Starting paginated run");

        let stop_reason = loop {
            let query = self.template.render_page(limit, offset)?;
            debug!(run, offset, limit, "Fetching page");

            let rows = match self.fetcher.fetch(&query, &self.schema).await {
                FetchOutcome::Failure(reason) => {
                    warn!(run, offset, %reason, "Stopping: page could not be fetched");
                    break StopReason::FetchFailed;
                }
                FetchOutcome::Success(rows) if rows.is_empty() => {
                    info!(run, offset, "No more data returned");
                    break StopReason::EmptyPage;
                }
                FetchOutcome::Success(rows) => rows,
            };

            let fetched = rows.len();
            table.extend(rows);
            batch_number += 1;
            pages += 1;
            offset += limit;
            info!(run, batch = batch_number, fetched, total = table.len(), "Page appended");

            if batch_number % interval == 0 {
                transition(run, &mut state, PipelineState::Checkpointing);
                self.store.save(&table, &Cursor::Offset(offset))?;
                checkpoints += 1;
                info!(run, batch = batch_number, offset, "Checkpoint saved");
                transition(run, &mut state, PipelineState::Running);
            }

            if cap > 0 && pages as u64 >= cap {
                info!(run, pages, "Testing cap reached");
                break StopReason::TestingCap;
            }

            if !courtesy.is_zero() {
                tokio::time::sleep(courtesy).await;
            }
        };
        transition(run, &mut state, PipelineState::Exhausted);

        let finalized = finalize_paginated(&self.store, table, self.template.key.as_deref())?;
        transition(run, &mut state, PipelineState::Done);

        Ok(RunReport {
            name: run.to_string(),
            mode: RunMode::Paginated,
            rows_written: finalized.rows,
            units_fetched: pages,
            units_failed: 0,
            checkpoints_written: checkpoints,
            stop_reason,
            final_path: finalized.path,
            resume_origin: resume.origin,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
