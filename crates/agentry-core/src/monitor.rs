//! Heartbeat monitor — the background sweep that expires silent instances.
//!
//! A periodic task scans the store: active instances whose heartbeat has
//! been silent past the timeout turn stale, and long-dead records are
//! purged outright. Sweep failures are logged and the loop carries on at
//! the next tick; it never takes the process down.

use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::RegistryError;
use crate::store::InstanceStore;

/// Sweep cadence and expiry thresholds. All three are configuration
/// inputs surfaced as CLI flags; none are hardcoded at call sites.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the sweep runs.
    pub sweep_interval_seconds: u64,
    /// Heartbeat silence after which an active instance turns stale.
    /// Typically 2–3× the interval instances heartbeat at.
    pub heartbeat_timeout_seconds: i64,
    /// Age after which stale and deregistered records are deleted outright.
    pub purge_timeout_seconds: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 30,
            heartbeat_timeout_seconds: 180,
            purge_timeout_seconds: 3600,
        }
    }
}

/// What a single sweep did.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub marked_stale: usize,
    pub purged: usize,
}

#[derive(Clone)]
pub struct HeartbeatMonitor {
    store: InstanceStore,
    config: MonitorConfig,
}

/// Handle to a running sweep task. Dropping it also stops the loop.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the sweep loop; resolves once an in-flight sweep (if any) has
    /// finished. Already-transitioned instances stay transitioned.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl HeartbeatMonitor {
    pub fn new(store: InstanceStore, config: MonitorConfig) -> Self {
        Self { store, config }
    }

    /// Spawn the periodic sweep on its own task and return its lifecycle
    /// handle.
    pub fn spawn(&self) -> MonitorHandle {
        let monitor = self.clone();
        let (tx, mut rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let period = StdDuration::from_secs(monitor.config.sweep_interval_seconds.max(1));
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = monitor.run_sweep_once().await {
                            tracing::error!("Registry sweep failed: {}", e);
                        }
                    }
                    _ = rx.changed() => {
                        tracing::info!("Heartbeat monitor shutting down");
                        break;
                    }
                }
            }
        });

        tracing::info!(
            "Started heartbeat monitor (sweep: {}s, stale after: {}s, purge after: {}s)",
            self.config.sweep_interval_seconds,
            self.config.heartbeat_timeout_seconds,
            self.config.purge_timeout_seconds
        );

        MonitorHandle { shutdown: tx, task }
    }

    /// Run one sweep (also used by tests and manual triggers).
    pub async fn run_sweep_once(&self) -> Result<SweepReport, RegistryError> {
        let marked_stale = self
            .store
            .mark_stale(Duration::seconds(self.config.heartbeat_timeout_seconds))
            .await?;
        let purged = self
            .store
            .purge_expired(Duration::seconds(self.config.purge_timeout_seconds))
            .await?;

        if marked_stale > 0 {
            tracing::info!("Marked {} instances stale", marked_stale);
        }
        if purged > 0 {
            tracing::info!("Purged {} expired instances", purged);
        }

        Ok(SweepReport {
            marked_stale,
            purged,
        })
    }
}
