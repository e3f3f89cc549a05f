//! # Orchestration Service
//!
//! Background loops that drive the campaign lifecycle:
//!
//! - scheduling pass every `scheduling.interval_seconds`
//! - monitor beat every `monitor.beat_interval_seconds`
//! - watchdog pass every `watchdog.interval_seconds` (throttled in the store too)
//!
//! Each loop logs and swallows per-tick failures. [`OrchestrationService::shutdown`]
//! stops all three after their current tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use super::generator::Generator;
use super::monitor::Monitor;
use super::registry::CampaignRegistry;
use super::scheduler::CampaignScheduler;
use super::watchdog::Watchdog;
use crate::config::OrchestrationConfig;
use crate::coordination::CoordinationStore;
use crate::executor::TaskExecutor;

#[derive(Debug, Clone)]
pub struct OrchestrationService {
    scheduler: CampaignScheduler,
    monitor: Monitor,
    watchdog: Watchdog,
    generator: Generator,
    intervals: LoopIntervals,
    shutdown: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Clone, Copy)]
struct LoopIntervals {
    scheduling: Duration,
    monitor: Duration,
    watchdog: Duration,
}

impl OrchestrationService {
    pub fn new(
        config: &OrchestrationConfig,
        store: Arc<dyn CoordinationStore>,
        executor: Arc<dyn TaskExecutor>,
        registry: Arc<CampaignRegistry>,
    ) -> Self {
        let generator = Generator::new(store.clone(), executor.clone(), config.watchdog.liveness_ttl());
        let scheduler = CampaignScheduler::new(
            store.clone(),
            registry.clone(),
            generator.clone(),
            config.scheduling.clone(),
            config.indexing.termination_ttl(),
        );
        let monitor = Monitor::new(store.clone(), registry.clone(), config.monitor.clone());
        let watchdog = Watchdog::new(
            store,
            executor,
            registry,
            config.watchdog.clone(),
            config.monitor.lock_timeout(),
        );

        Self {
            scheduler,
            monitor,
            watchdog,
            generator,
            intervals: LoopIntervals {
                scheduling: config.scheduling.interval(),
                monitor: config.monitor.beat_interval(),
                watchdog: config.watchdog.interval(),
            },
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    pub fn scheduler(&self) -> &CampaignScheduler {
        &self.scheduler
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Spawn the three loops; they run until [`Self::shutdown`]
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!(
            scheduling_seconds = self.intervals.scheduling.as_secs(),
            monitor_seconds = self.intervals.monitor.as_secs(),
            watchdog_seconds = self.intervals.watchdog.as_secs(),
            "Starting orchestration loops"
        );

        let scheduler = self.scheduler.clone();
        let monitor = self.monitor.clone();
        let watchdog = self.watchdog.clone();

        vec![
            self.spawn_loop("scheduler", self.intervals.scheduling, move || {
                let scheduler = scheduler.clone();
                async move { scheduler.run_pass().await.map(|_| ()) }
            }),
            self.spawn_loop("monitor", self.intervals.monitor, move || {
                let monitor = monitor.clone();
                async move { monitor.beat().await.map(|_| ()) }
            }),
            self.spawn_loop("watchdog", self.intervals.watchdog, move || {
                let watchdog = watchdog.clone();
                async move { watchdog.validate().await.map(|_| ()) }
            }),
        ]
    }

    pub fn shutdown(&self) {
        info!("Stopping orchestration loops");
        self.shutdown.send_replace(true);
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, period: Duration, mut tick: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = crate::error::OrchestrationResult<()>> + Send,
    {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if *shutdown.borrow_and_update() {
                    info!(service = name, "Orchestration loop stopped");
                    break;
                }
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!(service = name, "Orchestration loop stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        if let Err(e) = tick().await {
                            error!(service = name, error = %e, "Orchestration tick failed");
                        }
                    }
                }
            }
        })
    }
}
