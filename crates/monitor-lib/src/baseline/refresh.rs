//! Baseline refresh loop
//!
//! Periodically rebuilds the hourly baseline snapshot from the clean
//! series and atomically swaps it into the shared [`BaselineStore`].
//! A failed refresh leaves the previous snapshot serving.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant};
use tracing::{info, warn};

use super::{BaselineStore, MIN_BASELINE_SAMPLES};
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::observability::MonitorMetrics;
use crate::store::ReadingStore;

/// Configuration for the baseline refresh loop
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between refresh cycles (default: 1 hour)
    pub interval: Duration,
    /// Trailing window of clean readings to aggregate, in days (default: 7)
    pub window_days: i64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            window_days: 7,
        }
    }
}

/// Periodic job that rebuilds hourly baselines from the clean series
pub struct RefreshLoop {
    store: Arc<dyn ReadingStore>,
    baselines: Arc<BaselineStore>,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    config: RefreshConfig,
}

impl RefreshLoop {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        baselines: Arc<BaselineStore>,
        health: HealthRegistry,
        config: RefreshConfig,
    ) -> Self {
        Self {
            store,
            baselines,
            health,
            metrics: MonitorMetrics::new(),
            config,
        }
    }

    /// Run until shutdown. The first refresh happens immediately so the
    /// classifier does not start blind after a restart.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            window_days = self.config.window_days,
            "Starting baseline refresh loop"
        );

        let mut ticker = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    match self.refresh_once().await {
                        Ok(count) => {
                            let elapsed = start.elapsed();
                            self.metrics.observe_refresh_duration(elapsed.as_secs_f64());
                            self.health.set_healthy(components::BASELINE_REFRESH).await;
                            info!(
                                baselines = count,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "Baseline refresh complete"
                            );
                        }
                        Err(e) => {
                            self.health
                                .set_degraded(components::BASELINE_REFRESH, e.to_string())
                                .await;
                            warn!(error = %e, "Baseline refresh failed, previous snapshot stays active");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down baseline refresh loop");
                    break;
                }
            }
        }
    }

    /// Rebuild the snapshot from the trailing window and swap it in
    pub async fn refresh_once(&self) -> Result<usize> {
        let window_start = Utc::now() - chrono::Duration::days(self.config.window_days);
        let rows = self
            .store
            .collect_baselines(window_start, MIN_BASELINE_SAMPLES)
            .await?;
        let count = self.baselines.install(rows);
        self.metrics.set_baselines_loaded(count);
        Ok(count)
    }
}
