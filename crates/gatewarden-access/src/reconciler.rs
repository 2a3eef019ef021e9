//! Periodic status reconciliation.
//!
//! Purely temporal transitions (a link expiring at 3am, a future `active_on`
//! arriving) have no triggering request, so a background sweep re-derives the
//! status of every persisted-Active link on a fixed interval and persists the
//! flips. Disabled and deleted links are skipped entirely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::audit::{field_change, AuditAction, AuditRecordInput, AuditStore};
use crate::error::Result;
use crate::link::LinkStore;
use crate::status;
use crate::types::{Actor, RequestOrigin};

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Seconds between sweeps.
    pub interval_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Counters from a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Links whose persisted status was Active.
    pub examined: usize,
    /// Links whose status changed and was persisted.
    pub transitioned: usize,
}

/// Background worker re-applying the status calculator to all active links.
pub struct Reconciler {
    store: Arc<dyn LinkStore>,
    audit: Arc<dyn AuditStore>,
    config: ReconcilerConfig,
    shutdown: Arc<AtomicBool>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn LinkStore>,
        audit: Arc<dyn AuditStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            audit,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the run loop to stop after its current tick.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Handle for requesting shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run sweeps on the configured interval until shutdown is requested.
    ///
    /// Each tick takes the store's sweep lock first, so replicas sharing one
    /// store never run duplicate sweeps; a replica that loses the race skips
    /// the tick.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval_secs,
            "Starting link status reconciler"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));

        loop {
            ticker.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Reconciler shutdown requested, stopping");
                break;
            }

            match self.store.try_sweep_lock().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Another replica holds the sweep lock, skipping tick");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Could not acquire sweep lock, skipping tick");
                    continue;
                }
            }

            let result = self.sweep(Utc::now()).await;
            if let Err(e) = self.store.sweep_unlock().await {
                warn!(error = %e, "Failed to release sweep lock");
            }
            if let Err(e) = result {
                warn!(error = %e, "Reconciliation sweep failed");
            }
        }
    }

    /// Run one sweep at `now`: recompute every persisted-Active link and
    /// persist only the statuses that changed.
    ///
    /// Idempotent: a second immediate sweep performs zero writes, because
    /// flipped links leave the working set and unchanged links produce no
    /// recalculation result.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepStats> {
        let links = self.store.list_persisted_active().await?;
        let mut stats = SweepStats {
            examined: links.len(),
            transitioned: 0,
        };

        for mut link in links {
            let Some(settled) = status::recalculate(&link, now) else {
                continue;
            };

            let old_status = link.status;
            link.status = settled;
            link.updated_at = now;
            self.store.update(link.clone()).await?;
            stats.transitioned += 1;

            debug!(
                link_id = %link.id,
                code = %link.code,
                from = %old_status,
                to = %settled,
                "Reconciled link status"
            );

            let input = AuditRecordInput {
                action: AuditAction::StatusRecalculated,
                link_id: link.id,
                link_code: Some(link.code.clone()),
                link_name: Some(link.name.clone()),
                actor: Actor::system(),
                origin: RequestOrigin::default(),
                changes: Some(
                    [("status".to_string(), field_change(old_status, settled))].into(),
                ),
                context: None,
            };
            if let Err(e) = self.audit.append(input).await {
                tracing::error!(
                    target: "audit",
                    link_id = %link.id,
                    error = %e,
                    "Audit write failed; primary operation already committed"
                );
            }
        }

        if stats.transitioned > 0 {
            info!(
                examined = stats.examined,
                transitioned = stats.transitioned,
                "Reconciliation sweep persisted status changes"
            );
        }

        Ok(stats)
    }
}
