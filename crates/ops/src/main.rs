use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use matchday_core::SystemClock;
use matchday_infra::matches::InMemoryMatchSource;
use matchday_infra::{AutomationConfig, TracingAuditSink};
use matchday_observability::LogFormat;
use matchday_ops::cli::{Cli, Commands, SnapshotCommands};
use matchday_ops::dto::{CreateSnapshotRequest, TableRef, TriggerAllRequest, TriggerRequest};
use matchday_ops::{Engine, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format: LogFormat = cli.log_format.parse()?;
    matchday_observability::init(format);

    let config = AutomationConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let stores = match cli.database_url.as_deref() {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .context("connecting to Postgres")?;
            matchday_infra::MIGRATOR
                .run(&pool)
                .await
                .context("running database migrations")?;
            Stores::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores");
            Stores::in_memory(Arc::new(InMemoryMatchSource::new()))
        }
    };

    let engine = Engine::build(config, stores, Arc::new(TracingAuditSink), Arc::new(SystemClock));
    let ops = engine.facade();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&engine).await?,
        Commands::Recalculate { table, description } => {
            let receipt = ops.trigger(&TriggerRequest {
                table: TableRef::new(table),
                description,
            })?;
            let summary = ops.run_pending().await;
            print_json(&serde_json::json!({ "receipt": receipt, "summary": summary }))?;
        }
        Commands::RecalculateAll { description } => {
            let response = ops.trigger_all(&TriggerAllRequest { description }).await?;
            let summary = ops.run_pending().await;
            print_json(&serde_json::json!({ "receipts": response.receipts, "summary": summary }))?;
        }
        Commands::Snapshot(cmd) => match cmd {
            SnapshotCommands::Create { table, description } => {
                let id = ops
                    .create_snapshot(&CreateSnapshotRequest {
                        table: TableRef::new(table),
                        description,
                    })
                    .await?;
                print_json(&serde_json::json!({ "snapshot_id": id }))?;
            }
            SnapshotCommands::List { table } => {
                print_json(&ops.list_snapshots(table).await?)?;
            }
            SnapshotCommands::Diff { id } => {
                print_json(&ops.diff_snapshot(id).await?)?;
            }
            SnapshotCommands::Restore { id } => {
                print_json(&ops.restore_snapshot(id).await?)?;
            }
        },
    }

    Ok(())
}

/// Run the worker pool until Ctrl-C.
///
/// With automation enabled every known table is queued once at startup, so
/// changes made while the service was down are picked up. In manual-only mode
/// the pool still runs for operator triggers but nothing is queued on its own.
async fn serve(engine: &Engine) -> anyhow::Result<()> {
    let queue = engine.start();

    if let Err(err) = engine.startup_catch_up().await {
        tracing::warn!(error = %err, code = err.code(), "startup recalculation skipped");
    }

    tracing::info!("automation running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutting down");

    queue.shutdown().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
