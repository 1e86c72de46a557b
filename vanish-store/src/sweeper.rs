//! Background task that physically deletes expired envelopes.

use crate::ephemeral_store::EnvelopeStore;
use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

enum SweepCommand {
    SweepNow(oneshot::Sender<StoreResult<usize>>),
    Stop,
}

/// Periodically purges expired envelopes from an [`EnvelopeStore`].
pub struct ExpirySweeper {
    store: Arc<dyn EnvelopeStore>,
    interval: Duration,
    command_rx: mpsc::Receiver<SweepCommand>,
}

/// Handle for controlling a running sweeper.
#[derive(Clone)]
pub struct SweeperHandle {
    command_tx: mpsc::Sender<SweepCommand>,
}

impl SweeperHandle {
    /// Asks the sweeper to exit after its current pass.
    pub async fn stop(&self) -> StoreResult<()> {
        self.command_tx
            .send(SweepCommand::Stop)
            .await
            .map_err(|_| StoreError::Stopped)
    }

    /// Runs a purge immediately and returns how many envelopes it removed.
    pub async fn sweep_now(&self) -> StoreResult<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SweepCommand::SweepNow(reply_tx))
            .await
            .map_err(|_| StoreError::Stopped)?;
        reply_rx.await.map_err(|_| StoreError::Stopped)?
    }
}

/// Creates a sweeper and its handle. The caller spawns
/// [`ExpirySweeper::run`].
pub fn create_expiry_sweeper(
    store: Arc<dyn EnvelopeStore>,
    interval: Duration,
) -> (SweeperHandle, ExpirySweeper) {
    let (command_tx, command_rx) = mpsc::channel(8);
    let sweeper = ExpirySweeper {
        store,
        interval,
        command_rx,
    };
    (SweeperHandle { command_tx }, sweeper)
}

impl ExpirySweeper {
    /// Spawns the sweep loop on the current runtime.
    pub fn spawn(
        store: Arc<dyn EnvelopeStore>,
        interval: Duration,
    ) -> (SweeperHandle, tokio::task::JoinHandle<()>) {
        let (handle, sweeper) = create_expiry_sweeper(store, interval);
        let task = tokio::spawn(sweeper.run());
        (handle, task)
    }

    pub async fn run(mut self) {
        info!(interval_ms = self.interval.as_millis() as u64, "expiry sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip first immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!("expiry sweep failed: {e}");
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SweepCommand::SweepNow(reply)) => {
                            let _ = reply.send(self.sweep().await);
                        }
                        Some(SweepCommand::Stop) => {
                            info!("expiry sweeper stopping");
                            break;
                        }
                        None => {
                            debug!("all sweeper handles dropped, stopping");
                            break;
                        }
                    }
                }
            }
        }

        info!("expiry sweeper stopped");
    }

    async fn sweep(&self) -> StoreResult<usize> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.purge_expired(Utc::now()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("sweep task failed: {e}")))?
    }
}
