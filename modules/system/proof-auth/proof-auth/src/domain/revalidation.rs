//! Periodic sweep of the proof cache and the refresh-token store.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::plugin_host::PluginHost;
use super::token::RefreshTokenStore;

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidationSummary {
    pub checked: usize,
    pub removed: usize,
    pub expired_refresh_tokens: usize,
}

/// Issue time before which refresh tokens have outlived `ttl`.
fn purge_cutoff(ttl: Duration) -> Option<OffsetDateTime> {
    let ttl = time::Duration::try_from(ttl).ok()?;
    OffsetDateTime::now_utc().checked_sub(ttl)
}

pub struct RevalidationTask {
    host: Arc<PluginHost>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    interval: Duration,
    refresh_ttl: Option<Duration>,
}

impl RevalidationTask {
    #[must_use]
    pub fn new(
        host: Arc<PluginHost>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        interval: Duration,
        refresh_ttl: Option<Duration>,
    ) -> Self {
        Self {
            host,
            refresh_tokens,
            interval,
            refresh_ttl,
        }
    }

    /// Run a single sweep over every plugin scope.
    pub async fn run_once(&self) -> RevalidationSummary {
        let mut summary = RevalidationSummary::default();

        for (plugin, report) in self.host.revalidate_all().await {
            match report {
                Ok(report) => {
                    summary.checked += report.checked;
                    summary.removed += report.removed;
                }
                Err(e) => warn!(plugin = %plugin, error = %e, "Revalidation failed"),
            }
        }

        if let Some(ttl) = self.refresh_ttl {
            match purge_cutoff(ttl) {
                Some(cutoff) => match self.refresh_tokens.purge_issued_before(cutoff).await {
                    Ok(n) => summary.expired_refresh_tokens = n,
                    Err(e) => warn!(error = %e, "Refresh token purge failed"),
                },
                None => debug!("Refresh token TTL predates every representable date, nothing to purge"),
            }
        }

        debug!(
            checked = summary.checked,
            removed = summary.removed,
            expired_refresh_tokens = summary.expired_refresh_tokens,
            "Revalidation sweep finished"
        );
        summary
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Revalidation task started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        info!("Revalidation task stopped");
    }
}
