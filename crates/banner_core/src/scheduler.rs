//! Periodic rotation timer with generation-based tick suppression.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::domain::MIN_ROTATION_INTERVAL_MS;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

/// Receiver of rotation ticks. Every tick is one forward step.
///
/// Implementations must re-check [`TickToken::is_current`] inside whatever
/// critical section guards the state they mutate; the scheduler's own check
/// happens before that section is entered.
#[async_trait]
pub trait RotationTarget: Send + Sync {
    async fn rotate(&self, token: &TickToken);
}

/// Identifies the timer generation a tick belongs to.
#[derive(Debug, Clone)]
pub struct TickToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl TickToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

pub fn effective_interval_millis(requested_millis: i64) -> i64 {
    requested_millis.max(MIN_ROTATION_INTERVAL_MS)
}

pub struct RotationScheduler {
    target: Weak<dyn RotationTarget>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
    last_requested_millis: Option<i64>,
    effective_interval: Option<Duration>,
    clamp_warnings: u64,
}

impl RotationScheduler {
    pub fn new(target: Weak<dyn RotationTarget>) -> Self {
        Self {
            target,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
            last_requested_millis: None,
            effective_interval: None,
            clamp_warnings: 0,
        }
    }

    /// Cancels the running timer and starts a new generation whose first tick
    /// fires one full period from now. Callers apply any immediate step
    /// themselves. Must be called from within a tokio runtime.
    pub fn restart(&mut self, interval_millis: i64) -> u64 {
        self.cancel();
        let period = self.verify_interval(interval_millis);
        let generation = self.generation.load(Ordering::Acquire);
        let token = TickToken {
            generation,
            current: Arc::clone(&self.generation),
        };
        let target = self.target.clone();
        let first_tick = Instant::now() + period;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !token.is_current() {
                    break;
                }
                let Some(target) = target.upgrade() else {
                    break;
                };
                target.rotate(&token).await;
            }
        }));
        self.effective_interval = Some(period);

        debug!(
            generation,
            period_ms = period.as_millis() as u64,
            "rotation restarted"
        );
        generation
    }

    /// Stops future ticks. A tick already inside the target's critical section
    /// is allowed to finish. Idempotent.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.effective_interval = None;
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Period of the running timer, after clamping.
    pub fn effective_interval(&self) -> Option<Duration> {
        self.effective_interval
    }

    /// Number of times a too-low interval was reported.
    pub fn clamp_warnings(&self) -> u64 {
        self.clamp_warnings
    }

    fn verify_interval(&mut self, requested_millis: i64) -> Duration {
        let effective = effective_interval_millis(requested_millis);
        if effective != requested_millis && self.last_requested_millis != Some(requested_millis) {
            warn!(
                requested_ms = requested_millis,
                minimum_ms = MIN_ROTATION_INTERVAL_MS,
                "rotation interval is too low; using the minimum interval"
            );
            self.clamp_warnings += 1;
        }
        self.last_requested_millis = Some(requested_millis);
        Duration::from_millis(effective.unsigned_abs())
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
