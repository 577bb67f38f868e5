//! Liveness monitor: periodic eviction of idle connections.

use std::convert::Infallible;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{ConnectionId, Hub};
use crate::supervisor::supervise;

impl Hub {
    /// Tears down every connection idle for longer than the idle timeout.
    ///
    /// Returns the number of connections this sweep removed.
    pub async fn sweep_idle(&self) -> usize {
        let timeout = self.inner.settings.idle_timeout;
        let expired = self.inner.metadata.expired(timeout, Instant::now());

        let mut evicted = 0;
        for id in expired {
            if self.evict_if_idle(id, timeout).await {
                evicted += 1;
            }
        }
        evicted
    }

    /// Tears `id` down only if its record is still stale; a frame that
    /// arrived after the scan keeps the connection.
    async fn evict_if_idle(&self, id: ConnectionId, timeout: Duration) -> bool {
        let Some(meta) = self.inner.metadata.get(id) else {
            return false;
        };
        if meta.idle_for(Instant::now()) <= timeout {
            tracing::debug!(conn_id = %id, "activity since scan, eviction skipped");
            return false;
        }
        let addr = meta
            .remote_addr
            .map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
        if !self.teardown(id, "idle timeout").await {
            return false;
        }
        self.diagnostic(
            "hub::monitor",
            &format!("removed connection {id} from {addr} due to timeout"),
        );
        true
    }

    /// Sweeps once per idle timeout, forever.
    pub async fn run_monitor(&self) {
        let mut ticker = tokio::time::interval(self.inner.settings.idle_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = self.sweep_idle().await;
            if evicted > 0 {
                tracing::info!(evicted, "idle connections evicted");
            }
        }
    }

    /// Spawns the monitor under a supervisor that restarts it after
    /// `backoff` if it ever panics.
    #[must_use]
    pub fn spawn_monitor(&self, backoff: Duration) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(supervise("liveness-monitor", backoff, move || {
            let hub = hub.clone();
            async move {
                hub.run_monitor().await;
                Ok::<(), Infallible>(())
            }
        }))
    }
}
