use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use matchday_core::LeagueId;
use matchday_events::{EventBus, LeagueScoped, MatchLifecycleEvent, Subscription};

use crate::lifecycle::{LifecycleError, MatchLifecycleHandler};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Feeds lifecycle events from a bus subscription into a handler.
///
/// - `league_id`: when provided, events for other leagues are skipped
/// - duplicates are harmless, the queue deduplicates per league+season
#[derive(Debug)]
pub struct LifecycleWorker;

impl LifecycleWorker {
    pub fn spawn<B, H>(
        name: &'static str,
        bus: B,
        league_id: Option<LeagueId>,
        handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<MatchLifecycleEvent> + Send + Sync + 'static,
        H: MatchLifecycleHandler + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<MatchLifecycleEvent> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, league_id, &handler))?;

        info!(worker = name, league_id = ?league_id, "lifecycle worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<H>(
    name: &'static str,
    sub: Subscription<MatchLifecycleEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    league_id: Option<LeagueId>,
    handler: &H,
) where
    H: MatchLifecycleHandler,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let event = match sub.recv_timeout(tick) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if league_id.is_some() && event.league_id() != league_id {
            continue;
        }

        match handler.handle(&event) {
            Ok(outcome) => debug!(
                worker = name,
                match_id = %event.match_id(),
                kind = event.kind(),
                ?outcome,
                "lifecycle event handled"
            ),
            Err(LifecycleError::Rejected(report)) => warn!(
                worker = name,
                match_id = %event.match_id(),
                errors = %report,
                "lifecycle event rejected"
            ),
            Err(err) => warn!(
                worker = name,
                match_id = %event.match_id(),
                error = %err,
                "lifecycle handler failed"
            ),
        }
    }

    info!(worker = name, "lifecycle worker stopped");
}
