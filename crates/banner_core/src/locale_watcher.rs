//! Follows the session locale and keeps the alarm watcher bound to the
//! matching localized collection.

use std::sync::Arc;

use retained_alarms::RetainedAlarmsRoot;
use shared::{domain::LocaleId, protocol::RetainedAlarmsEvent};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::alarm_watcher::AlarmSetWatcher;

pub struct LocaleSwitchWatcher {
    root: Arc<dyn RetainedAlarmsRoot>,
    session_locale: watch::Receiver<Option<LocaleId>>,
    alarms: Arc<AlarmSetWatcher>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LocaleSwitchWatcher {
    pub fn new(
        root: Arc<dyn RetainedAlarmsRoot>,
        session_locale: watch::Receiver<Option<LocaleId>>,
        alarms: Arc<AlarmSetWatcher>,
    ) -> Self {
        Self {
            root,
            session_locale,
            alarms,
            task: Mutex::new(None),
        }
    }

    /// Binds the collection of the current session locale without notifying
    /// the controller, then keeps following locale switches and locale
    /// creation in the background. Returns the locale that was resolved.
    pub async fn start(&self) -> LocaleId {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let mut session = self.session_locale.clone();
        // Subscribe before resolving so a creation racing with the lookup is
        // still seen.
        let created = self.root.subscribe_locales();
        let active = LocaleId::or_default(session.borrow_and_update().as_ref());

        match self.root.localized_alarms(&active).await {
            Some(collection) => self.alarms.bind(collection).await,
            None => {
                debug!(locale = %active, "localized alarms not created yet; waiting");
                self.alarms.unbind().await;
            }
        }

        *task = Some(tokio::spawn(follow_locale(
            Arc::clone(&self.root),
            Arc::clone(&self.alarms),
            session,
            created,
            active.clone(),
        )));
        active
    }

    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }
}

impl Drop for LocaleSwitchWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn follow_locale(
    root: Arc<dyn RetainedAlarmsRoot>,
    alarms: Arc<AlarmSetWatcher>,
    mut session: watch::Receiver<Option<LocaleId>>,
    mut created: broadcast::Receiver<RetainedAlarmsEvent>,
    mut active: LocaleId,
) {
    let mut session_open = true;
    let mut root_open = true;

    while session_open || root_open {
        tokio::select! {
            changed = session.changed(), if session_open => {
                if changed.is_err() {
                    debug!("session locale signal closed");
                    session_open = false;
                    continue;
                }
                let next = LocaleId::or_default(session.borrow_and_update().as_ref());
                if next == active {
                    continue;
                }
                info!(from = %active, to = %next, "session locale switched");
                active = next;
                rebind_locale(root.as_ref(), &alarms, &active).await;
            }
            event = created.recv(), if root_open => match event {
                Ok(RetainedAlarmsEvent::LocaleCreated(locale)) => {
                    if locale == active && alarms.bound_locale().await.as_ref() != Some(&active) {
                        info!(locale = %locale, "localized alarms created; binding");
                        rebind_locale(root.as_ref(), &alarms, &active).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "locale creation events lagged; re-resolving active locale");
                    if alarms.bound_locale().await.as_ref() != Some(&active) {
                        rebind_locale(root.as_ref(), &alarms, &active).await;
                    }
                }
                Err(RecvError::Closed) => {
                    debug!("retained alarms root closed its event stream");
                    root_open = false;
                }
            },
        }
    }
}

async fn rebind_locale(root: &dyn RetainedAlarmsRoot, alarms: &AlarmSetWatcher, locale: &LocaleId) {
    let collection = root.localized_alarms(locale).await;
    if collection.is_none() {
        debug!(locale = %locale, "localized alarms not created yet; waiting");
    }
    alarms.rebind(collection).await;
}

#[cfg(test)]
#[path = "tests/locale_watcher_tests.rs"]
mod tests;
