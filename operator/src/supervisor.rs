//! C10: two cooperating workers — periodic sweep and event-driven watch —
//! sharing one `OperatorState`, both stopping at the next quiescent point
//! after a shutdown signal (spec.md §4.9/§5).
//!
//! Grounded in the teacher's `sidecar/src/operator.rs` `tokio::select!`
//! pattern around a forceful-shutdown future and a unit of work, generalized
//! from one worker to two.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::crd::MongoClusterConfiguration;
use crate::operator_state::OperatorState;
use crate::reconcile::{drain_replica_set_events, garbage_sweep, handle_watch_event, sweep};

pub struct Supervisor {
    state: Arc<OperatorState>,
    config: Config,
}

impl Supervisor {
    #[must_use]
    pub fn new(state: Arc<OperatorState>, config: Config) -> Self {
        Self { state, config }
    }

    /// Runs both workers until `shutdown` fires, then waits for both to
    /// return.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let periodic = tokio::spawn(periodic_worker(self.state.clone(), self.config.sweep_interval, shutdown.clone()));
        let event_driven = tokio::spawn(event_worker(self.state.clone(), self.config.watch_timeout, shutdown.clone()));

        let _ = shutdown.changed().await;
        info!("shutdown signal received, waiting for workers to quiesce");

        let _ = tokio::join!(periodic, event_driven);
        info!("supervisor stopped");
    }
}

async fn periodic_worker(state: Arc<OperatorState>, interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("periodic worker shutting down");
                return;
            }
            _ = ticker.tick() => {
                drain_replica_set_events(&state).await;
                sweep(&state).await;
                garbage_sweep(&state).await;
            }
        }
    }
}

async fn event_worker(state: Arc<OperatorState>, watch_timeout: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            info!("event worker shutting down");
            return;
        }

        let stream = match state.k8s.watch::<MongoClusterConfiguration>("0", watch_timeout).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "failed to open cluster-resource watch, retrying shortly");
                if wait_or_shutdown(&mut shutdown, watch_timeout).await {
                    return;
                }
                continue;
            }
        };
        tokio::pin!(stream);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("event worker shutting down");
                    return;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => handle_watch_event(&state, event).await,
                    Some(Err(err)) => {
                        warn!(%err, "watch stream reported an error, reopening");
                        break;
                    }
                    None => {
                        // stream ended cleanly (bounded read timeout): reopen.
                        break;
                    }
                },
            }
        }
    }
}

/// Waits up to `timeout` for a shutdown signal, returning `true` if one
/// arrived.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, timeout: std::time::Duration) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        () = tokio::time::sleep(timeout) => false,
    }
}
