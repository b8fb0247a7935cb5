use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::NotificationEngine;

const STARTUP_DELAY: Duration = Duration::from_secs(30);
const HOURLY_INTERVAL: Duration = Duration::from_secs(60 * 60);
const SIX_HOURLY_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Owns the timers that fire notification cycles: one delayed run shortly
/// after startup, then an hourly and a six-hourly cadence. The overlap is
/// intentional redundancy — the scanner's dedup-by-day exclusion means a
/// doubled firing sends nothing twice. The engine's in-flight guard covers
/// the remaining race, a slow cycle still running when the next timer fires.
pub struct NotificationScheduler {
    engine: Arc<NotificationEngine>,
    handles: Vec<JoinHandle<()>>,
}

impl NotificationScheduler {
    pub fn new(engine: Arc<NotificationEngine>) -> Self {
        Self {
            engine,
            handles: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            return;
        }
        info!("Starting notification scheduler");

        let engine = Arc::clone(&self.engine);
        self.handles.push(tokio::spawn(async move {
            tokio::time::sleep(STARTUP_DELAY).await;
            fire(&engine, "startup").await;
        }));

        self.handles.push(spawn_interval(
            Arc::clone(&self.engine),
            HOURLY_INTERVAL,
            "hourly",
        ));
        self.handles.push(spawn_interval(
            Arc::clone(&self.engine),
            SIX_HOURLY_INTERVAL,
            "six-hourly",
        ));
    }

    pub fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        info!("Stopping notification scheduler");
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for NotificationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_interval(
    engine: Arc<NotificationEngine>,
    period: Duration,
    trigger: &'static str,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick of a tokio interval completes immediately; the
        // startup task already covers that run.
        interval.tick().await;
        loop {
            interval.tick().await;
            fire(&engine, trigger).await;
        }
    })
}

async fn fire(engine: &NotificationEngine, trigger: &str) {
    match engine.try_run_cycle().await {
        Some(Ok(summary)) => info!(
            trigger,
            overdue = summary.overdue,
            due_soon = summary.due_soon,
            delivered = summary.delivered,
            "Scheduled notification cycle finished"
        ),
        Some(Err(e)) => error!(trigger, error = %e, "Scheduled notification cycle failed"),
        None => debug!(trigger, "Cycle already in flight, skipping this firing"),
    }
}
