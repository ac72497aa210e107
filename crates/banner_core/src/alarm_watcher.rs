//! Membership watch over the currently bound localized alarm collection.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use retained_alarms::AlarmCollection;
use shared::{
    domain::{AlarmHandle, LocaleId},
    protocol::MembershipEvent,
};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// Receiver of membership changes forwarded by [`AlarmSetWatcher`].
#[async_trait]
pub trait MembershipSink: Send + Sync {
    async fn membership_added(&self, alarm: AlarmHandle);
    async fn membership_removed(&self, alarm: AlarmHandle);
    /// The bound collection was replaced, or events were lost; state derived
    /// from the old view must be recomputed.
    async fn binding_changed(&self);
}

/// Holds the single active collection binding and its event registration.
pub struct AlarmSetWatcher {
    sink: Weak<dyn MembershipSink>,
    binding: RwLock<Option<Arc<dyn AlarmCollection>>>,
    registration: Mutex<Option<JoinHandle<()>>>,
}

impl AlarmSetWatcher {
    pub fn new(sink: Weak<dyn MembershipSink>) -> Self {
        Self {
            sink,
            binding: RwLock::new(None),
            registration: Mutex::new(None),
        }
    }

    /// Replaces the observed collection. The previous registration is
    /// disposed before the new one is installed, and the new one is live when
    /// this returns.
    pub async fn bind(&self, collection: Arc<dyn AlarmCollection>) {
        let mut registration = self.registration.lock().await;
        if let Some(previous) = registration.take() {
            previous.abort();
        }

        let events = collection.subscribe();
        let locale = collection.locale().clone();
        *self.binding.write().await = Some(collection);
        *registration = Some(spawn_forwarder(self.sink.clone(), events, locale.clone()));

        debug!(locale = %locale, "alarm watcher bound");
    }

    pub async fn unbind(&self) {
        let mut registration = self.registration.lock().await;
        if let Some(previous) = registration.take() {
            previous.abort();
        }
        if let Some(previous) = self.binding.write().await.take() {
            debug!(locale = %previous.locale(), "alarm watcher unbound");
        }
    }

    /// Binds (or unbinds, for `None`) and tells the sink to resynchronize.
    pub async fn rebind(&self, collection: Option<Arc<dyn AlarmCollection>>) {
        match collection {
            Some(collection) => self.bind(collection).await,
            None => self.unbind().await,
        }
        if let Some(sink) = self.sink.upgrade() {
            sink.binding_changed().await;
        }
    }

    pub async fn collection(&self) -> Option<Arc<dyn AlarmCollection>> {
        self.binding.read().await.clone()
    }

    pub async fn bound_locale(&self) -> Option<LocaleId> {
        self.binding
            .read()
            .await
            .as_ref()
            .map(|collection| collection.locale().clone())
    }
}

impl Drop for AlarmSetWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.registration.get_mut().take() {
            task.abort();
        }
    }
}

fn spawn_forwarder(
    sink: Weak<dyn MembershipSink>,
    mut events: broadcast::Receiver<MembershipEvent>,
    locale: LocaleId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = events.recv().await;
            let Some(sink) = sink.upgrade() else {
                break;
            };
            match event {
                Ok(MembershipEvent::Added(alarm)) => sink.membership_added(alarm).await,
                Ok(MembershipEvent::Removed(alarm)) => sink.membership_removed(alarm).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        locale = %locale,
                        skipped,
                        "alarm watcher lagged behind membership events; resynchronizing"
                    );
                    sink.binding_changed().await;
                }
                Err(RecvError::Closed) => {
                    debug!(locale = %locale, "alarm collection closed its event stream");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/alarm_watcher_tests.rs"]
mod tests;
