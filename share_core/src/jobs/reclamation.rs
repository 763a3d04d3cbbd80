//! Periodic purge of expired and exhausted files.

use parking_lot::RwLock;
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::files::{File, FileManager};

#[derive(Debug, Clone)]
pub struct ReclamationConfig {
    pub interval: Duration,
    /// Upper bound per candidate set per sweep.
    pub batch_size: u32,
}

impl Default for ReclamationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepState {
    Idle,
    Scanning,
    Purging,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_found: usize,
    pub exhausted_found: usize,
    pub purged: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ReclamationScheduler {
    manager: FileManager,
    config: ReclamationConfig,
    state: Arc<RwLock<SweepState>>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag and returns to `Idle` however the sweep ends.
struct SweepGuard<'a> {
    scheduler: &'a ReclamationScheduler,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        *self.scheduler.state.write() = SweepState::Idle;
        self.scheduler.in_flight.store(false, Ordering::Release);
    }
}

impl ReclamationScheduler {
    pub fn new(manager: FileManager, config: ReclamationConfig) -> Self {
        Self {
            manager,
            config,
            state: Arc::new(RwLock::new(SweepState::Idle)),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SweepState {
        *self.state.read()
    }

    pub fn config(&self) -> &ReclamationConfig {
        &self.config
    }

    /// Runs one sweep, or returns `Ok(None)` without doing anything when
    /// another sweep is still running.
    pub async fn sweep(&self) -> Result<Option<SweepReport>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reclamation sweep already in progress, skipping");
            return Ok(None);
        }
        let _guard = SweepGuard { scheduler: self };

        *self.state.write() = SweepState::Scanning;
        let now = self.manager.now();
        let repository = self.manager.repository();
        let expired = repository.list_expired(now, self.config.batch_size).await?;
        let exhausted = repository.list_exhausted(now, self.config.batch_size).await?;

        let mut report = SweepReport {
            expired_found: expired.len(),
            exhausted_found: exhausted.len(),
            ..Default::default()
        };
        debug!(
            expired = report.expired_found,
            exhausted = report.exhausted_found,
            "Reclamation scan complete"
        );

        *self.state.write() = SweepState::Purging;
        for file in expired.iter().chain(exhausted.iter()) {
            match self.purge(file).await {
                Ok(()) => report.purged += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(file_id = %file.id, "Failed to reclaim file, will retry next sweep: {}", e);
                }
            }
        }

        if report.purged > 0 || report.failed > 0 {
            info!(
                purged = report.purged,
                failed = report.failed,
                "Reclamation sweep finished"
            );
        }

        Ok(Some(report))
    }

    async fn purge(&self, file: &File) -> Result<()> {
        self.manager.delete(file).await?;
        info!(file_id = %file.id, name = %file.original_name, "Reclaimed file");
        Ok(())
    }

    /// Ticks until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_seconds = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Reclamation scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!("Reclamation sweep aborted: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reclamation scheduler stopped");
    }

    /// Spawns `run` on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
