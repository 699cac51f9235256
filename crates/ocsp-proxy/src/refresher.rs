//! Background cache re-validation
//!
//! The refresher walks every cached entry on a fixed cycle and replays the
//! stored request against its recorded responder before the entry expires,
//! so that serving paths rarely pay upstream latency. Entries comfortably
//! inside the first half of their validity window are re-checked daily;
//! past the midpoint the schedule tightens to hourly.
//!
//! The refresher treats every failure as transient: a store problem skips
//! the rest of the cycle, an upstream problem skips one entry. It never
//! deletes over a failed refetch, only over entries that can no longer be
//! refreshed at all (missing responder or request). Convergence across
//! multiple proxy instances sharing one store is best-effort.

use crate::config::{ProxyConfig, RefreshConfig};
use crate::entry::{unix_now, CacheEntry};
use crate::fetch::OcspFetcher;
use crate::store::{CacheStore, StoreError};
use crate::writer::CacheWriter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Periodic re-validation worker
pub struct Refresher {
    config: Arc<ProxyConfig>,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<OcspFetcher>,
    writer: CacheWriter,
}

impl Refresher {
    pub fn new(
        config: Arc<ProxyConfig>,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<OcspFetcher>,
        writer: CacheWriter,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            writer,
        }
    }

    /// Run cycles forever. The first cycle starts immediately; the sleep sits
    /// between cycles, and a cycle is never cancelled midway.
    pub async fn run(self) {
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.config.refresh.cycle()).await;
        }
    }

    /// Walk all cached entries once
    pub async fn run_cycle(&self) {
        let prefix = &self.config.store.key_prefix;

        let keys = match self.store.list_keys(prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "refresh cycle skipped: cannot enumerate keys");
                return;
            }
        };
        debug!(entries = keys.len(), "refresh cycle started");

        for key in keys {
            let entry = match self.store.get(&key).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(StoreError::Unavailable(e)) => {
                    warn!(error = %e, "refresh cycle aborted: store unavailable");
                    return;
                }
                Err(e @ StoreError::Corrupt { .. }) => {
                    warn!(cache_key = %key, error = %e, "evicting undecodable entry");
                    self.writer.delete(key);
                    continue;
                }
            };

            if !entry.is_refreshable() {
                warn!(cache_key = %key, "evicting entry without responder or request");
                self.writer.delete(key);
                continue;
            }

            let now = unix_now();
            if !is_due(&self.config.refresh, &entry, now) {
                continue;
            }

            self.refresh_entry(&key, &entry, now).await;
        }
    }

    async fn refresh_entry(&self, key: &str, entry: &CacheEntry, now: i64) {
        match self
            .fetcher
            .fetch_validated(&entry.ocsp_responder, &entry.request)
            .await
        {
            Ok(fetched) if fetched.nonce_count == 0 => {
                let refreshed = CacheEntry {
                    cache_key: key.to_string(),
                    ocsp_responder: entry.ocsp_responder.clone(),
                    request: entry.request.clone(),
                    response: fetched.raw,
                    thisupd: fetched.single.this_update,
                    nextupd: fetched.single.next_update.unwrap_or(0),
                    lastchecked: now,
                    status: fetched.single.cert_status,
                    nonce: 0,
                };
                info!(cache_key = %key, status = %refreshed.status, "refreshed");
                self.writer.upsert(refreshed);
            }
            Ok(fetched) => {
                warn!(
                    cache_key = %key,
                    nonce_count = fetched.nonce_count,
                    "refresh response carries a nonce, not persisted"
                );
            }
            Err(e) => {
                warn!(
                    cache_key = %key,
                    upstream = %entry.ocsp_responder,
                    error = %e,
                    "refresh fetch failed"
                );
            }
        }
    }
}

/// The re-validation interval for an entry: the early (daily) interval while
/// `now` is before the midpoint of the validity window, the late (hourly)
/// interval after it.
fn revalidation_interval(refresh: &RefreshConfig, thisupd: i64, nextupd: i64, now: i64) -> i64 {
    let midpoint = thisupd + (nextupd - thisupd) / 2;
    if midpoint > now {
        refresh.early_interval_secs
    } else {
        refresh.late_interval_secs
    }
}

/// Whether an entry must be refetched now
fn is_due(refresh: &RefreshConfig, entry: &CacheEntry, now: i64) -> bool {
    entry.lastchecked + revalidation_interval(refresh, entry.thisupd, entry.nextupd, now) < now
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocsp_proto::CertStatus;

    fn entry(thisupd: i64, nextupd: i64, lastchecked: i64) -> CacheEntry {
        CacheEntry {
            cache_key: "ocspxy_aa_1".into(),
            ocsp_responder: "ocsp.example.com".into(),
            request: vec![1],
            response: vec![2],
            thisupd,
            nextupd,
            lastchecked,
            status: CertStatus::Good,
            nonce: 0,
        }
    }

    #[test]
    fn test_interval_before_midpoint_is_daily() {
        let refresh = RefreshConfig::default();
        let now = 1_000_000;
        // window 990_000..1_030_000, midpoint 1_010_000 is ahead of now
        assert_eq!(
            revalidation_interval(&refresh, 990_000, 1_030_000, now),
            86_400
        );
    }

    #[test]
    fn test_interval_past_midpoint_is_hourly() {
        let refresh = RefreshConfig::default();
        let now = 1_000_000;
        // window 900_000..1_000_000, midpoint 950_000 has passed
        assert_eq!(
            revalidation_interval(&refresh, 900_000, 1_000_000, now),
            3600
        );
    }

    #[test]
    fn test_interval_at_exact_midpoint_is_hourly() {
        let refresh = RefreshConfig::default();
        // midpoint == now is not "midpoint > now"
        assert_eq!(revalidation_interval(&refresh, 0, 2_000, 1_000), 3600);
    }

    #[test]
    fn test_due_when_lastchecked_plus_interval_passed() {
        let refresh = RefreshConfig::default();
        let now = 1_000_000;

        // past midpoint, checked 2h ago: 3600 interval elapsed
        assert!(is_due(&refresh, &entry(900_000, 1_000_000, now - 7200), now));

        // past midpoint, checked 30min ago: not yet
        assert!(!is_due(&refresh, &entry(900_000, 1_000_000, now - 1800), now));
    }

    #[test]
    fn test_due_boundary_is_strict() {
        let refresh = RefreshConfig::default();
        let now = 1_000_000;
        // lastchecked + 3600 == now is not yet due
        assert!(!is_due(&refresh, &entry(900_000, 1_000_000, now - 3600), now));
        assert!(is_due(&refresh, &entry(900_000, 1_000_000, now - 3601), now));
    }

    #[test]
    fn test_midpoint_schedule_example() {
        // thisupd=0, nextupd=2*now: midpoint is exactly now, so the hourly
        // interval applies, and a check 2h ago is due for a refetch.
        let refresh = RefreshConfig::default();
        let now = 500_000;
        let e = entry(0, 2 * now, now - 7200);
        assert_eq!(revalidation_interval(&refresh, e.thisupd, e.nextupd, now), 3600);
        assert!(is_due(&refresh, &e, now));
    }
}
