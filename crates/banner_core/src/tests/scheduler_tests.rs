use super::*;
use tokio::sync::Mutex;

#[derive(Default)]
struct RecordingTarget {
    ticks: Mutex<Vec<u64>>,
}

#[async_trait]
impl RotationTarget for RecordingTarget {
    async fn rotate(&self, token: &TickToken) {
        let mut ticks = self.ticks.lock().await;
        if token.is_current() {
            ticks.push(token.generation());
        }
    }
}

fn scheduler_for(target: &Arc<RecordingTarget>) -> RotationScheduler {
    let target: Arc<dyn RotationTarget> = target.clone();
    RotationScheduler::new(Arc::downgrade(&target))
}

async fn settle() {
    time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn first_tick_comes_one_period_after_restart() {
    let target = Arc::new(RecordingTarget::default());
    let mut scheduler = scheduler_for(&target);

    let generation = scheduler.restart(1000);
    settle().await;
    assert!(target.ticks.lock().await.is_empty());

    time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(*target.ticks.lock().await, vec![generation]);

    time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(*target.ticks.lock().await, vec![generation, generation]);
}

#[tokio::test(start_paused = true)]
async fn rapid_restarts_only_tick_the_last_generation() {
    let target = Arc::new(RecordingTarget::default());
    let mut scheduler = scheduler_for(&target);

    scheduler.restart(500);
    scheduler.restart(500);
    let last = scheduler.restart(500);
    time::sleep(Duration::from_millis(600)).await;

    assert_eq!(*target.ticks.lock().await, vec![last]);
    assert_eq!(scheduler.generation(), last);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_future_ticks_and_is_idempotent() {
    let target = Arc::new(RecordingTarget::default());
    let mut scheduler = scheduler_for(&target);

    scheduler.restart(500);
    time::sleep(Duration::from_millis(600)).await;
    scheduler.cancel();
    scheduler.cancel();
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.effective_interval(), None);

    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(target.ticks.lock().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn too_low_interval_is_clamped_and_reported_once_per_value() {
    let target = Arc::new(RecordingTarget::default());
    let mut scheduler = scheduler_for(&target);

    scheduler.restart(10);
    assert_eq!(
        scheduler.effective_interval(),
        Some(Duration::from_millis(500))
    );
    scheduler.restart(10);
    assert_eq!(scheduler.clamp_warnings(), 1);

    scheduler.restart(20);
    scheduler.restart(10);
    assert_eq!(scheduler.clamp_warnings(), 3);

    scheduler.restart(5000);
    assert_eq!(
        scheduler.effective_interval(),
        Some(Duration::from_millis(5000))
    );
    assert_eq!(scheduler.clamp_warnings(), 3);
}

#[test]
fn negative_intervals_clamp_to_minimum() {
    assert_eq!(effective_interval_millis(-40), MIN_ROTATION_INTERVAL_MS);
    assert_eq!(effective_interval_millis(0), MIN_ROTATION_INTERVAL_MS);
    assert_eq!(effective_interval_millis(750), 750);
}

#[tokio::test(start_paused = true)]
async fn dropped_target_ends_the_timer_task() {
    let target = Arc::new(RecordingTarget::default());
    let mut scheduler = scheduler_for(&target);
    drop(target);

    scheduler.restart(500);
    time::sleep(Duration::from_secs(2)).await;
    let task = scheduler.task.take().expect("task handle");
    assert!(task.is_finished());
}
