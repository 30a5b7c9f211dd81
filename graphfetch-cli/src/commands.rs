//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use graphfetch_core::config::{HarvestConfig, workspace_config_path};
use graphfetch_core::{
    BatchedPipeline, CheckpointStore, Fetcher, KeySet, OffsetPipeline, QueryTemplate, RateLimiter,
    RetryPolicy, RunReport, SparqlClient,
};
use std::path::Path;
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config: &HarvestConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Paginate {
            name,
            template,
            limit,
            max_batches,
        } => handle_paginate(&name, &template, limit, max_batches, config).await,
        Commands::Supplement {
            name,
            source,
            column,
            template,
        } => handle_supplement(&name, &source, &column, &template, config).await,
        Commands::Status { name, batched } => handle_status(&name, batched, config),
        Commands::Clear { name, batched } => handle_clear(&name, batched, config),
        Commands::Config { action } => handle_config(action, workspace, config),
    }
}

fn build_fetcher(config: &HarvestConfig) -> anyhow::Result<Fetcher> {
    let client = SparqlClient::new(&config.endpoint)?;
    Ok(Fetcher::new(
        Arc::new(client),
        Arc::new(RateLimiter::from_config(&config.rate_limit)),
        RetryPolicy::from_config(&config.retry),
    ))
}

fn store_for(name: &str, batched: bool, config: &HarvestConfig) -> CheckpointStore {
    let target_dir = &config.storage.target_dir;
    if batched {
        CheckpointStore::batched(name, target_dir, &config.batched.output_prefix)
    } else {
        CheckpointStore::paginated(name, target_dir)
    }
}

fn print_report(report: &RunReport) {
    println!("Run '{}' finished: {}", report.name, report.stop_reason);
    println!("  Started from:  {}", report.resume_origin);
    println!("  Fetched:       {}", report.units_fetched);
    if report.units_failed > 0 {
        println!("  Failed:        {}", report.units_failed);
    }
    println!("  Checkpoints:   {}", report.checkpoints_written);
    println!("  Rows written:  {}", report.rows_written);
    println!("  Output:        {}", report.final_path.display());
    println!("  Elapsed:       {}s", report.elapsed().num_seconds());
}

async fn handle_paginate(
    name: &str,
    template: &Path,
    limit: Option<u64>,
    max_batches: Option<u64>,
    config: &HarvestConfig,
) -> anyhow::Result<()> {
    let template = QueryTemplate::load(template)?;
    let mut settings = config.pagination.clone();
    if let Some(limit) = limit {
        anyhow::ensure!(limit > 0, "--limit must be greater than zero");
        settings.limit = limit;
    }
    if let Some(max_batches) = max_batches {
        settings.max_batches_for_testing = max_batches;
    }

    let pipeline = OffsetPipeline::new(
        name,
        template,
        build_fetcher(config)?,
        &config.storage.target_dir,
        settings,
    )?;
    let report = pipeline.run().await?;
    print_report(&report);
    Ok(())
}

async fn handle_supplement(
    name: &str,
    source: &Path,
    column: &str,
    template: &Path,
    config: &HarvestConfig,
) -> anyhow::Result<()> {
    let template = QueryTemplate::load(template)?;
    let keys = KeySet::from_csv(source, column, &config.batched.key_prefix)
        .map_err(|e| anyhow::anyhow!("Failed to read keys from {}: {}", source.display(), e))?;
    if keys.is_empty() {
        tracing::warn!(source = %source.display(), column, "No usable keys in source column");
    }

    let pipeline = BatchedPipeline::new(
        name,
        template,
        build_fetcher(config)?,
        keys,
        &config.storage.target_dir,
        config.batched.clone(),
    )?;
    let report = pipeline.run().await?;
    print_report(&report);
    Ok(())
}

fn handle_status(name: &str, batched: bool, config: &HarvestConfig) -> anyhow::Result<()> {
    let store = store_for(name, batched, config);
    let status = store.status()?;

    println!("Run '{}'", name);
    match &status.checkpoint {
        Some((rows, cursor)) => println!("  Checkpoint:  {} rows at {}", rows, cursor),
        None => println!("  Checkpoint:  none"),
    }
    if status.incomplete_pair {
        println!(
            "  Warning:     incomplete checkpoint pair in {}",
            store.checkpoint_dir().display()
        );
    }
    match status.final_rows {
        Some(rows) => println!(
            "  Final:       {} rows in {}",
            rows,
            store.final_path().display()
        ),
        None => println!("  Final:       not written"),
    }
    Ok(())
}

fn handle_clear(name: &str, batched: bool, config: &HarvestConfig) -> anyhow::Result<()> {
    let store = store_for(name, batched, config);
    store.clear()?;
    println!("Cleared checkpoints for '{}'", name);
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config: &HarvestConfig,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let default_config = HarvestConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphfetch_core::Cursor;
    use graphfetch_core::table::{Record, Table};
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> HarvestConfig {
        let mut config = HarvestConfig::default();
        config.storage.target_dir = dir.join("data");
        config
    }

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, &config_in(workspace))
            .await
            .unwrap();

        let config_path = workspace.join(".graphfetch").join("config.toml");
        assert!(config_path.exists());

        // Verify it's valid TOML
        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: HarvestConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, HarvestConfig::default());
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let config = config_in(workspace);

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, &config).await.unwrap();

        let config_path = workspace.join(".graphfetch").join("config.toml");
        std::fs::write(&config_path, "[pagination]\nlimit = 10\n").unwrap();

        // Second init should not overwrite
        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, &config).await.unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("limit = 10"));
    }

    #[tokio::test]
    async fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Config {
            action: ConfigAction::Show,
        };
        let result = handle_command(command, dir.path(), &config_in(dir.path())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_status_and_clear() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let store = store_for("paintings", false, &config);

        let mut table = Table::new();
        table.push(Record::new().with("item", Some("Q1")));
        store.save(&table, &Cursor::Offset(1000)).unwrap();

        let status = Commands::Status {
            name: "paintings".into(),
            batched: false,
        };
        handle_command(status, dir.path(), &config).await.unwrap();

        let clear = Commands::Clear {
            name: "paintings".into(),
            batched: false,
        };
        handle_command(clear, dir.path(), &config).await.unwrap();
        assert!(!store.table_path().exists());
        assert!(!store.cursor_path().exists());
    }

    #[test]
    fn test_store_for_batched_uses_output_prefix() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let store = store_for("authors", true, &config);
        assert!(store.final_path().ends_with("data/wikidata_authors.csv"));
    }

    #[tokio::test]
    async fn test_paginate_rejects_missing_template() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Paginate {
            name: "paintings".into(),
            template: dir.path().join("missing.toml"),
            limit: None,
            max_batches: None,
        };
        let err = handle_command(command, dir.path(), &config_in(dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
