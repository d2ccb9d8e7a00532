use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{info, warn};

use crate::sync::SyncOrchestrator;

/// Single background task driving startup and recurring full syncs.
pub struct SyncScheduler {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// `every: None` runs the startup sync (if enabled) and nothing else.
    pub fn start(
        orchestrator: Arc<SyncOrchestrator>,
        on_startup: bool,
        every: Option<Duration>,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            if on_startup {
                info!("Running startup search sync");
                orchestrator.try_sync_all().await;
            }

            let Some(every) = every else {
                return;
            };
            if every.is_zero() {
                warn!("Sync interval of zero, recurring search sync disabled");
                return;
            }

            info!("Scheduling search sync every {}s", every.as_secs());
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        orchestrator.try_sync_all().await;
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Search sync schedule stopped");
        });

        Self { stop, handle }
    }

    /// Signals the task and waits for it. A sync in progress finishes first.
    pub async fn stop(self) {
        let _ = self.stop.send(true);

        if let Err(e) = self.handle.await {
            warn!("Sync scheduler task ended abnormally: {e}");
        }
    }
}
