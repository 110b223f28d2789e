//! Periodic maintenance job loops.

use super::manager::NumberPoolManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Intervals for the periodic pool jobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the replenish sweep runs.
    pub replenish_interval: Duration,
    /// How often the cleanup sweep runs.
    pub cleanup_interval: Duration,
    /// How often the cooldown sweep runs.
    pub cooldown_interval: Duration,
    /// How often vendor health probes run; `None` disables the probe loop.
    pub health_check_interval: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            replenish_interval: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            cooldown_interval: Duration::from_secs(10 * 60),
            health_check_interval: None,
        }
    }
}

impl SchedulerConfig {
    /// Create a new builder for SchedulerConfig.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

/// Builder for SchedulerConfig.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the replenish sweep interval.
    ///
    /// Default: 5 minutes
    pub fn replenish_interval(mut self, interval: Duration) -> Self {
        self.config.replenish_interval = interval;
        self
    }

    /// Set the cleanup sweep interval.
    ///
    /// Default: 1 hour
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    /// Set the cooldown sweep interval.
    ///
    /// Default: 10 minutes
    pub fn cooldown_interval(mut self, interval: Duration) -> Self {
        self.config.cooldown_interval = interval;
        self
    }

    /// Enable periodic vendor health probes at the given interval.
    ///
    /// Default: disabled
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = Some(interval);
        self
    }

    /// Build the SchedulerConfig.
    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Drives the pool maintenance jobs on independent schedules.
///
/// Each job runs in its own task so a slow sweep never delays the others;
/// skipped ticks are not replayed. The manager's per-job guards keep a sweep
/// from overlapping itself even if a run outlasts its interval.
#[derive(Debug)]
pub struct PoolScheduler {
    manager: Arc<NumberPoolManager>,
    config: SchedulerConfig,
}

impl PoolScheduler {
    /// Create a scheduler over the given manager.
    pub fn new(manager: Arc<NumberPoolManager>, config: SchedulerConfig) -> Self {
        Self { manager, config }
    }

    /// Spawn every job loop and hand back a shutdown handle.
    ///
    /// The first run of each job happens one full interval after spawning.
    pub fn spawn(self) -> SchedulerHandle {
        let token = CancellationToken::new();
        let mut tasks = Vec::new();

        let manager = self.manager.clone();
        tasks.push(spawn_loop(
            "replenish",
            self.config.replenish_interval,
            token.clone(),
            move || {
                let manager = manager.clone();
                async move {
                    manager.auto_replenish_pool().await;
                }
            },
        ));

        let manager = self.manager.clone();
        tasks.push(spawn_loop(
            "cleanup",
            self.config.cleanup_interval,
            token.clone(),
            move || {
                let manager = manager.clone();
                async move {
                    manager.cleanup_expired_numbers().await;
                }
            },
        ));

        let manager = self.manager.clone();
        tasks.push(spawn_loop(
            "cooldown",
            self.config.cooldown_interval,
            token.clone(),
            move || {
                let manager = manager.clone();
                async move {
                    manager.process_cooldown_numbers().await;
                }
            },
        ));

        if let Some(interval) = self.config.health_check_interval {
            let manager = self.manager.clone();
            tasks.push(spawn_loop(
                "health_check",
                interval,
                token.clone(),
                move || {
                    let manager = manager.clone();
                    async move {
                        manager.selector().perform_health_checks().await;
                    }
                },
            ));
        }

        #[cfg(feature = "tracing")]
        info!(jobs = tasks.len(), "Pool scheduler started");
        SchedulerHandle { token, tasks }
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    #[cfg(feature = "tracing")]
                    debug!(job = name, "Job loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    job().await;
                }
            }
        }
    })
}

/// Handle over the spawned job loops.
#[derive(Debug)]
pub struct SchedulerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop every job loop and wait for in-flight runs to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        #[cfg(feature = "tracing")]
        info!("Pool scheduler stopped");
    }
}
