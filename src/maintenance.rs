// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Maintenance
//!
//! Hourly background sweep that purges expired refresh tokens and compacts
//! the database file. Both steps go through the single redb writer, so the
//! sweep can interleave freely with request handlers.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`; a sweep that already started
//! runs to completion before the task returns.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::storage::{Database, RefreshTokenRepository};

/// Interval between sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub purged_tokens: usize,
    pub compacted: bool,
}

pub struct MaintenanceTask {
    db: Arc<Database>,
    interval: Duration,
}

impl MaintenanceTask {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            interval: SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run sweeps until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(MaintenanceTask::new(db).run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Storage maintenance starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Storage maintenance shutting down");
                    return;
                }
            }

            let db = self.db.clone();
            match tokio::task::spawn_blocking(move || sweep(&db)).await {
                Ok(report) => info!(
                    purged_tokens = report.purged_tokens,
                    compacted = report.compacted,
                    "Storage maintenance sweep finished"
                ),
                Err(e) => warn!(error = %e, "Storage maintenance sweep panicked"),
            }
        }
    }
}

/// Purge expired refresh tokens, then compact. Each step failing is logged
/// and leaves the other unaffected.
pub fn sweep(db: &Database) -> SweepReport {
    let mut report = SweepReport::default();

    match RefreshTokenRepository::new(db).purge_expired(Utc::now()) {
        Ok(purged) => report.purged_tokens = purged,
        Err(e) => warn!(error = %e, "Failed to purge expired refresh tokens"),
    }

    match db.compact() {
        Ok(compacted) => report.compacted = compacted,
        Err(e) => warn!(error = %e, "Database compaction skipped"),
    }

    report
}
