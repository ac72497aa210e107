//! The banner controller: rotation state, navigation, and the locking
//! discipline shared by membership events, ticks and restarts.
//!
//! Two critical sections guard the state, always acquired in this order:
//!
//! 1. the restart section (`restart`), held for the whole handling of a
//!    navigation command, membership event, rebinding or interval change,
//!    including the scheduler restart;
//! 2. the step section (`state`), held while the index or selection is
//!    mutated. Timer ticks take only this section.
//!
//! Navigation, interval changes and the first alarm of an empty collection
//! step the selection right away, inside both sections, and then restart the
//! scheduler so the next automatic step comes a full period later. A tick from
//! a superseded generation that is waiting on the step section observes a
//! stale token once it gets in.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use retained_alarms::{AlarmCollection, RetainedAlarmsRoot};
use shared::{
    domain::{AlarmHandle, Direction, LocaleId, RotationConfig},
    error::BannerError,
    protocol::BannerSnapshot,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, trace};

use crate::{
    alarm_watcher::{AlarmSetWatcher, MembershipSink},
    locale_watcher::LocaleSwitchWatcher,
    scheduler::{RotationScheduler, RotationTarget, TickToken},
};

/// Selection state of the banner.
///
/// `current_index` is `-1` exactly when nothing is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationState {
    pub current_alarm: Option<AlarmHandle>,
    pub current_index: i64,
    pub alarm_count: usize,
}

impl RotationState {
    pub const EMPTY: RotationState = RotationState {
        current_alarm: None,
        current_index: -1,
        alarm_count: 0,
    };

    /// Moves one position in `direction` with wraparound and resolves the
    /// alarm at the new index.
    pub fn advance(&mut self, direction: Direction, alarms: Option<&dyn AlarmCollection>) {
        self.alarm_count = alarms.map_or(0, |alarms| alarms.len());
        self.current_index = step_index(self.current_index, direction, self.alarm_count);
        self.resolve(alarms);
    }

    /// Resolves the alarm at `current_index`. A stale index is reset to 0 and
    /// retried once; if that fails too the selection becomes empty.
    pub fn resolve(&mut self, alarms: Option<&dyn AlarmCollection>) {
        let lookup = |index: i64| {
            let index = usize::try_from(index).ok()?;
            alarms?.alarm_at(index)
        };

        let mut alarm = lookup(self.current_index);
        if alarm.is_none() && self.current_index > 0 {
            self.current_index = 0;
            alarm = lookup(0);
        }

        match alarm {
            Some(alarm) => self.current_alarm = Some(alarm),
            None => {
                self.current_alarm = None;
                self.current_index = -1;
            }
        }
    }

    /// Re-points the index at the displayed alarm after other entries moved.
    fn follow_displayed(&mut self, alarms: Option<&dyn AlarmCollection>) {
        if self.current_index < 0 {
            return;
        }
        if let Some(position) = self
            .current_alarm
            .and_then(|alarm| alarms.and_then(|alarms| alarms.position_of(alarm)))
        {
            self.current_index = position as i64;
        }
    }

    pub fn snapshot(&self) -> BannerSnapshot {
        BannerSnapshot {
            displayed: if self.current_index >= 0 {
                self.current_alarm
            } else {
                None
            },
            index: self.current_index,
            alarm_count: self.alarm_count,
        }
    }
}

impl Default for RotationState {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Index arithmetic treating the collection as circular.
pub fn step_index(index: i64, direction: Direction, len: usize) -> i64 {
    let len = len as i64;
    match direction {
        Direction::Forward => {
            let next = index + 1;
            if len == 0 {
                -1
            } else if next >= len {
                0
            } else {
                next
            }
        }
        Direction::Backward => {
            let previous = index - 1;
            let previous = if previous < 0 { len - 1 } else { previous };
            previous.max(0)
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    config_task: Option<JoinHandle<()>>,
}

pub struct BannerController {
    alarms: Arc<AlarmSetWatcher>,
    locales: LocaleSwitchWatcher,
    rotation_config: watch::Receiver<RotationConfig>,
    lifecycle: Mutex<Lifecycle>,
    running: AtomicBool,
    restart: Mutex<RotationScheduler>,
    state: Mutex<RotationState>,
    published: watch::Sender<BannerSnapshot>,
}

impl BannerController {
    pub fn new(
        root: Arc<dyn RetainedAlarmsRoot>,
        session_locale: watch::Receiver<Option<LocaleId>>,
        rotation_config: watch::Receiver<RotationConfig>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|controller: &Weak<Self>| {
            let sink: Weak<dyn MembershipSink> = controller.clone();
            let target: Weak<dyn RotationTarget> = controller.clone();
            let alarms = Arc::new(AlarmSetWatcher::new(sink));
            let (published, _) = watch::channel(BannerSnapshot::EMPTY);
            Self {
                locales: LocaleSwitchWatcher::new(root, session_locale, Arc::clone(&alarms)),
                alarms,
                rotation_config,
                lifecycle: Mutex::new(Lifecycle::default()),
                running: AtomicBool::new(false),
                restart: Mutex::new(RotationScheduler::new(target)),
                state: Mutex::new(RotationState::EMPTY),
                published,
            }
        })
    }

    /// Resets the selection, binds the session locale's alarms, starts
    /// following membership, locale and interval changes, and starts the
    /// rotation moving forward.
    pub async fn start(self: &Arc<Self>) -> Result<(), BannerError> {
        tokio::runtime::Handle::try_current().map_err(|_| BannerError::NoRuntime)?;

        let mut lifecycle = self.lifecycle.lock().await;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(BannerError::AlreadyStarted);
        }

        {
            let _restart = self.restart.lock().await;
            *self.state.lock().await = RotationState::EMPTY;
        }
        self.published.send_replace(BannerSnapshot::EMPTY);

        let locale = self.locales.start().await;
        lifecycle.config_task = Some(self.spawn_config_watch());
        self.restart_rotation(Direction::Forward).await;

        info!(locale = %locale, "alarm banner started");
        Ok(())
    }

    /// Cancels the timer and every registration. Safe on a controller that
    /// never started or only partly started; idempotent.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let was_running = self.running.swap(false, Ordering::AcqRel);

        if let Some(task) = lifecycle.config_task.take() {
            task.abort();
        }
        self.locales.stop().await;
        self.alarms.unbind().await;
        {
            let mut scheduler = self.restart.lock().await;
            scheduler.cancel();
            *self.state.lock().await = RotationState::EMPTY;
        }
        self.published.send_replace(BannerSnapshot::EMPTY);

        if was_running {
            info!("alarm banner stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shows the next alarm now and restarts the automatic cadence.
    pub async fn next(&self) {
        self.restart_rotation(Direction::Forward).await;
    }

    /// Shows the previous alarm now and restarts the automatic cadence.
    pub async fn previous(&self) {
        self.restart_rotation(Direction::Backward).await;
    }

    pub fn snapshot(&self) -> BannerSnapshot {
        *self.published.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BannerSnapshot> {
        self.published.subscribe()
    }

    pub async fn rotation_state(&self) -> RotationState {
        *self.state.lock().await
    }

    pub async fn rotation_generation(&self) -> u64 {
        self.restart.lock().await.generation()
    }

    pub async fn effective_interval(&self) -> Option<Duration> {
        self.restart.lock().await.effective_interval()
    }

    fn interval_millis(&self) -> i64 {
        self.rotation_config.borrow().interval_millis
    }

    fn spawn_config_watch(self: &Arc<Self>) -> JoinHandle<()> {
        let mut config = self.rotation_config.clone();
        let _ = config.borrow_and_update();
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            while config.changed().await.is_ok() {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let requested_ms = config.borrow_and_update().interval_millis;
                debug!(requested_ms, "rotation interval changed");
                controller.restart_rotation(Direction::Forward).await;
            }
        })
    }

    async fn restart_rotation(&self, direction: Direction) {
        let mut scheduler = self.restart.lock().await;
        if !self.is_running() {
            debug!(?direction, "rotation restart ignored; banner is stopped");
            return;
        }

        let alarms = self.alarms.collection().await;
        let mut state = self.state.lock().await;
        self.step_and_restart(&mut scheduler, &mut state, direction, alarms.as_deref());
        debug!(?direction, index = state.current_index, "rotation stepped on request");
    }

    /// Steps once now and restarts the cadence. Both sections must be held.
    fn step_and_restart(
        &self,
        scheduler: &mut RotationScheduler,
        state: &mut RotationState,
        direction: Direction,
        alarms: Option<&dyn AlarmCollection>,
    ) {
        state.advance(direction, alarms);
        self.publish(state);
        scheduler.restart(self.interval_millis());
    }

    fn publish(&self, state: &RotationState) {
        self.published.send_replace(state.snapshot());
    }
}

#[async_trait]
impl RotationTarget for BannerController {
    async fn rotate(&self, token: &TickToken) {
        let alarms = self.alarms.collection().await;
        let mut state = self.state.lock().await;
        if !token.is_current() {
            trace!(generation = token.generation(), "dropping stale rotation tick");
            return;
        }

        state.advance(Direction::Forward, alarms.as_deref());
        self.publish(&state);
        trace!(
            generation = token.generation(),
            index = state.current_index,
            alarm = ?state.current_alarm,
            "rotation step"
        );
    }
}

#[async_trait]
impl MembershipSink for BannerController {
    async fn membership_added(&self, alarm: AlarmHandle) {
        let mut scheduler = self.restart.lock().await;
        if !self.is_running() {
            return;
        }

        let alarms = self.alarms.collection().await;
        let alarms = alarms.as_deref();
        let mut state = self.state.lock().await;
        state.alarm_count = alarms.map_or(0, |alarms| alarms.len());

        if state.current_alarm.is_none() {
            // Show the head right away; adds racing in behind this one then
            // find a selection and leave it alone.
            state.current_index = -1;
            self.step_and_restart(&mut scheduler, &mut state, Direction::Forward, alarms);
            debug!(%alarm, shown = ?state.current_alarm, "first alarm raised; rotation restarted");
        } else {
            state.follow_displayed(alarms);
            self.publish(&state);
        }
    }

    async fn membership_removed(&self, alarm: AlarmHandle) {
        let mut scheduler = self.restart.lock().await;
        if !self.is_running() {
            return;
        }

        let alarms = self.alarms.collection().await;
        let alarms = alarms.as_deref();
        let mut state = self.state.lock().await;
        state.alarm_count = alarms.map_or(0, |alarms| alarms.len());

        let displayed_removed = state.current_alarm == Some(alarm);
        if state.alarm_count == 0 || displayed_removed {
            if displayed_removed {
                // The successor now occupies the removed position; step back
                // so the forward restart lands on it.
                state.current_index = (state.current_index - 1).max(-1);
            }
            self.step_and_restart(&mut scheduler, &mut state, Direction::Forward, alarms);
            debug!(%alarm, displayed_removed, "alarm removed; rotation restarted");
        } else {
            state.follow_displayed(alarms);
            self.publish(&state);
        }
    }

    async fn binding_changed(&self) {
        let mut scheduler = self.restart.lock().await;
        if !self.is_running() {
            return;
        }

        let alarms = self.alarms.collection().await;
        let alarms = alarms.as_deref();
        let mut state = self.state.lock().await;
        state.alarm_count = alarms.map_or(0, |alarms| alarms.len());

        let position = state
            .current_alarm
            .and_then(|current| alarms.and_then(|alarms| alarms.position_of(current)));
        match (state.current_alarm, position) {
            (None, _) => {
                state.current_index = -1;
                if state.alarm_count > 0 {
                    debug!("rebound collection has alarms; restarting rotation");
                    self.step_and_restart(&mut scheduler, &mut state, Direction::Forward, alarms);
                }
            }
            (Some(_), Some(position)) => state.current_index = position as i64,
            (Some(_), None) => {
                let last = state.alarm_count as i64 - 1;
                state.current_index = state.current_index.min(last);
                state.resolve(alarms);
            }
        }
        self.publish(&state);
        debug!(
            index = state.current_index,
            alarm_count = state.alarm_count,
            "rotation resynchronized after rebinding"
        );
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
