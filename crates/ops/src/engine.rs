//! Wires stores, queue, snapshot store and lifecycle adapter together.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use matchday_core::Clock;
use matchday_infra::AutomationConfig;
use matchday_infra::audit::AuditSink;
use matchday_infra::jobs::{
    InMemoryJobStore, JobStore, QueueHandle, QueueManager, QueueSettings, RecalculationRunner,
};
use matchday_infra::lifecycle::LifecycleAdapter;
use matchday_infra::locks::KeyLocks;
use matchday_infra::matches::{InMemoryMatchSource, MatchSource, PostgresMatchSource};
use matchday_infra::read_model::{
    InMemoryStandingsRepository, PostgresStandingsRepository, StandingsRepository,
};
use matchday_infra::snapshots::{
    InMemorySnapshotRepository, PostgresSnapshotRepository, SnapshotRepository, SnapshotStore,
};

use crate::dto::{TriggerAllRequest, TriggerResponse};
use crate::errors::OpsError;
use crate::facade::OperationsFacade;

/// The three persistent stores the engine talks to.
#[derive(Clone)]
pub struct Stores {
    pub matches: Arc<dyn MatchSource>,
    pub standings: Arc<dyn StandingsRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
}

impl Stores {
    pub fn in_memory(matches: Arc<InMemoryMatchSource>) -> Self {
        Self {
            matches,
            standings: Arc::new(InMemoryStandingsRepository::new()),
            snapshots: Arc::new(InMemorySnapshotRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            matches: Arc::new(PostgresMatchSource::new(pool.clone())),
            standings: Arc::new(PostgresStandingsRepository::new(pool.clone())),
            snapshots: Arc::new(PostgresSnapshotRepository::new(pool)),
        }
    }
}

/// A fully wired automation engine.
pub struct Engine {
    config: AutomationConfig,
    stores: Stores,
    queue: Arc<QueueManager>,
    snapshots: Arc<SnapshotStore>,
}

impl Engine {
    pub fn build(
        config: AutomationConfig,
        stores: Stores,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_job_store(config, stores, InMemoryJobStore::arc(), audit, clock)
    }

    pub fn with_job_store(
        config: AutomationConfig,
        stores: Stores,
        jobs: Arc<dyn JobStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let snapshots = Arc::new(SnapshotStore::new(
            stores.snapshots.clone(),
            stores.standings.clone(),
            KeyLocks::new(),
            audit.clone(),
            clock.clone(),
            config.snapshot_retention(),
        ));
        let runner = Arc::new(RecalculationRunner::new(
            stores.matches.clone(),
            snapshots.clone(),
        ));
        let queue = Arc::new(QueueManager::new(
            jobs,
            runner,
            audit,
            clock,
            QueueSettings::from(&config),
        ));

        info!(
            concurrency = config.concurrency,
            automation_enabled = config.enabled,
            "automation engine wired"
        );

        Self {
            config,
            stores,
            queue,
            snapshots,
        }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Lifecycle handler honouring the automation toggle.
    pub fn lifecycle_adapter(&self) -> LifecycleAdapter {
        LifecycleAdapter::new(self.queue.clone(), self.config.enabled)
    }

    pub fn facade(&self) -> OperationsFacade {
        OperationsFacade::new(
            self.queue.clone(),
            self.snapshots.clone(),
            self.stores.matches.clone(),
        )
    }

    /// Start the background worker pool.
    pub fn start(&self) -> QueueHandle {
        self.queue.spawn()
    }

    /// Queue every known table once so results recorded while the service
    /// was down are picked up. Returns `None` in manual-only mode, where
    /// nothing is queued without an operator.
    pub async fn startup_catch_up(&self) -> Result<Option<TriggerResponse>, OpsError> {
        if !self.config.enabled {
            info!("automation disabled; startup recalculation skipped");
            return Ok(None);
        }
        let response = self
            .facade()
            .trigger_all(&TriggerAllRequest {
                description: Some("startup catch-up".to_string()),
            })
            .await?;
        info!(tables = response.receipts.len(), "startup recalculation queued");
        Ok(Some(response))
    }
}
