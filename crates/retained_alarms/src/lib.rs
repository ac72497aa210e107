//! Retained-alarms collaborators: the collection seams the banner core watches,
//! plus in-memory implementations backed by broadcast channels.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use shared::{
    domain::{AlarmHandle, LocaleId},
    protocol::{MembershipEvent, RetainedAlarmsEvent},
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("alarm {alarm} is already present in locale {locale}")]
    Duplicate { alarm: AlarmHandle, locale: LocaleId },
    #[error("alarm {alarm} is not present in locale {locale}")]
    NotFound { alarm: AlarmHandle, locale: LocaleId },
}

/// A live, externally owned list of alarms rendered in one locale.
///
/// Positions are only meaningful at the instant they are read; the collection
/// may change between any two calls.
pub trait AlarmCollection: Send + Sync {
    fn locale(&self) -> &LocaleId;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn alarm_at(&self, index: usize) -> Option<AlarmHandle>;
    fn position_of(&self, alarm: AlarmHandle) -> Option<usize>;
    /// Registers for add/remove events. The registration is live as soon as
    /// this returns.
    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent>;
}

/// The root under which one alarm collection per locale lives.
#[async_trait]
pub trait RetainedAlarmsRoot: Send + Sync {
    async fn localized_alarms(&self, locale: &LocaleId) -> Option<Arc<dyn AlarmCollection>>;
    fn subscribe_locales(&self) -> broadcast::Receiver<RetainedAlarmsEvent>;
}

pub struct LocalizedAlarms {
    locale: LocaleId,
    alarms: RwLock<Vec<AlarmHandle>>,
    events: broadcast::Sender<MembershipEvent>,
}

impl LocalizedAlarms {
    pub fn new(locale: LocaleId) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            locale,
            alarms: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Appends an alarm. The event is sent while the write lock is held so
    /// observers see events in mutation order.
    pub fn add(&self, alarm: AlarmHandle) -> Result<(), CollectionError> {
        let mut alarms = self.alarms.write().unwrap_or_else(PoisonError::into_inner);
        if alarms.contains(&alarm) {
            return Err(CollectionError::Duplicate {
                alarm,
                locale: self.locale.clone(),
            });
        }
        alarms.push(alarm);
        let _ = self.events.send(MembershipEvent::Added(alarm));
        Ok(())
    }

    pub fn remove(&self, alarm: AlarmHandle) -> Result<(), CollectionError> {
        let mut alarms = self.alarms.write().unwrap_or_else(PoisonError::into_inner);
        let Some(position) = alarms.iter().position(|candidate| *candidate == alarm) else {
            return Err(CollectionError::NotFound {
                alarm,
                locale: self.locale.clone(),
            });
        };
        alarms.remove(position);
        let _ = self.events.send(MembershipEvent::Removed(alarm));
        Ok(())
    }

    pub fn clear(&self) {
        let mut alarms = self.alarms.write().unwrap_or_else(PoisonError::into_inner);
        for alarm in alarms.drain(..) {
            let _ = self.events.send(MembershipEvent::Removed(alarm));
        }
    }

    pub fn snapshot(&self) -> Vec<AlarmHandle> {
        self.alarms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AlarmCollection for LocalizedAlarms {
    fn locale(&self) -> &LocaleId {
        &self.locale
    }

    fn len(&self) -> usize {
        self.alarms.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn alarm_at(&self, index: usize) -> Option<AlarmHandle> {
        self.alarms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .copied()
    }

    fn position_of(&self, alarm: AlarmHandle) -> Option<usize> {
        self.alarms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .position(|candidate| *candidate == alarm)
    }

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }
}

/// In-memory retained-alarms root. Locale collections are created lazily the
/// first time they are requested through [`InMemoryRetainedAlarms::ensure_locale`].
pub struct InMemoryRetainedAlarms {
    locales: RwLock<HashMap<LocaleId, Arc<LocalizedAlarms>>>,
    events: broadcast::Sender<RetainedAlarmsEvent>,
}

impl InMemoryRetainedAlarms {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            locales: RwLock::new(HashMap::new()),
            events,
        })
    }

    pub fn with_locales<I>(locales: I) -> Arc<Self>
    where
        I: IntoIterator<Item = LocaleId>,
    {
        let root = Self::new();
        for locale in locales {
            root.ensure_locale(&locale);
        }
        root
    }

    pub fn get(&self, locale: &LocaleId) -> Option<Arc<LocalizedAlarms>> {
        self.locales
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(locale)
            .cloned()
    }

    /// Returns the collection for `locale`, creating and announcing it if it
    /// does not exist yet.
    pub fn ensure_locale(&self, locale: &LocaleId) -> Arc<LocalizedAlarms> {
        let mut locales = self.locales.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = locales.get(locale) {
            return Arc::clone(existing);
        }

        let created = Arc::new(LocalizedAlarms::new(locale.clone()));
        locales.insert(locale.clone(), Arc::clone(&created));
        debug!(locale = %locale, "retained alarms: created locale collection");
        let _ = self
            .events
            .send(RetainedAlarmsEvent::LocaleCreated(locale.clone()));
        created
    }

    /// Raises an alarm in every listed locale, creating missing collections.
    pub fn raise(&self, alarm: AlarmHandle, locales: &[LocaleId]) -> Result<(), CollectionError> {
        for locale in locales {
            self.ensure_locale(locale).add(alarm)?;
        }
        Ok(())
    }

    /// Clears an alarm from every locale that currently holds it.
    pub fn retire(&self, alarm: AlarmHandle) -> usize {
        let collections: Vec<_> = self
            .locales
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        collections
            .iter()
            .filter(|collection| collection.remove(alarm).is_ok())
            .count()
    }
}

#[async_trait]
impl RetainedAlarmsRoot for InMemoryRetainedAlarms {
    async fn localized_alarms(&self, locale: &LocaleId) -> Option<Arc<dyn AlarmCollection>> {
        self.get(locale)
            .map(|collection| collection as Arc<dyn AlarmCollection>)
    }

    fn subscribe_locales(&self) -> broadcast::Receiver<RetainedAlarmsEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
