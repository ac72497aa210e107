use super::*;
use retained_alarms::LocalizedAlarms;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Added(AlarmHandle),
    Removed(AlarmHandle),
    Rebound,
}

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<Seen>>,
}

#[async_trait]
impl MembershipSink for RecordingSink {
    async fn membership_added(&self, alarm: AlarmHandle) {
        self.seen.lock().await.push(Seen::Added(alarm));
    }

    async fn membership_removed(&self, alarm: AlarmHandle) {
        self.seen.lock().await.push(Seen::Removed(alarm));
    }

    async fn binding_changed(&self) {
        self.seen.lock().await.push(Seen::Rebound);
    }
}

fn watcher_for(sink: &Arc<RecordingSink>) -> AlarmSetWatcher {
    let sink: Arc<dyn MembershipSink> = sink.clone();
    AlarmSetWatcher::new(Arc::downgrade(&sink))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn forwards_add_and_remove_from_bound_collection() {
    let sink = Arc::new(RecordingSink::default());
    let watcher = watcher_for(&sink);
    let alarms = Arc::new(LocalizedAlarms::new(LocaleId::new("en-US")));

    watcher.bind(alarms.clone()).await;
    alarms.add(AlarmHandle(1)).expect("add");
    alarms.remove(AlarmHandle(1)).expect("remove");
    settle().await;

    assert_eq!(
        *sink.seen.lock().await,
        vec![Seen::Added(AlarmHandle(1)), Seen::Removed(AlarmHandle(1))]
    );
    assert_eq!(watcher.bound_locale().await, Some(LocaleId::new("en-US")));
}

#[tokio::test(start_paused = true)]
async fn rebinding_disposes_the_previous_registration() {
    let sink = Arc::new(RecordingSink::default());
    let watcher = watcher_for(&sink);
    let english = Arc::new(LocalizedAlarms::new(LocaleId::new("en-US")));
    let italian = Arc::new(LocalizedAlarms::new(LocaleId::new("it-IT")));

    watcher.bind(english.clone()).await;
    watcher.rebind(Some(italian.clone())).await;
    watcher.bind(italian.clone()).await;

    english.add(AlarmHandle(1)).expect("add en");
    italian.add(AlarmHandle(2)).expect("add it");
    settle().await;

    assert_eq!(
        *sink.seen.lock().await,
        vec![Seen::Rebound, Seen::Added(AlarmHandle(2))]
    );
}

#[tokio::test(start_paused = true)]
async fn unbind_stops_delivery_and_clears_collection() {
    let sink = Arc::new(RecordingSink::default());
    let watcher = watcher_for(&sink);
    let alarms = Arc::new(LocalizedAlarms::new(LocaleId::new("en-US")));

    watcher.bind(alarms.clone()).await;
    watcher.rebind(None).await;
    alarms.add(AlarmHandle(3)).expect("add");
    settle().await;

    assert!(watcher.collection().await.is_none());
    assert_eq!(*sink.seen.lock().await, vec![Seen::Rebound]);
}

#[tokio::test(start_paused = true)]
async fn lagged_event_stream_requests_resync() {
    let sink = Arc::new(RecordingSink::default());
    let watcher = watcher_for(&sink);
    let alarms = Arc::new(LocalizedAlarms::new(LocaleId::new("en-US")));

    watcher.bind(alarms.clone()).await;
    // Overflow the broadcast buffer before the forwarder gets to run.
    for id in 0..300 {
        alarms.add(AlarmHandle(id)).expect("add");
    }
    settle().await;

    let seen = sink.seen.lock().await;
    assert_eq!(seen.first(), Some(&Seen::Rebound));
    assert!(seen.len() < 300);
}
