use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::queue::{MessageQueue, TimedMessage};

/// Minimum time a feedback message stays on screen once shown.
pub const DEFAULT_MINIMUM_DURATION: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct PendingWake {
    epoch: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct DebouncerState {
    queue: MessageQueue,
    wake: Option<PendingWake>,
    wake_epoch: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<DebouncerState>,
    active: watch::Sender<Option<TimedMessage>>,
    minimum_duration: Duration,
}

/// Single-active-item feedback queue with a minimum visible duration.
///
/// Cloning yields another handle onto the same queue. All mutations, including
/// the timer-driven purge, go through one lock, and at most one wake timer is
/// pending at any time.
#[derive(Debug, Clone)]
pub struct MessageDebouncer {
    shared: Arc<Shared>,
}

impl Default for MessageDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_DURATION)
    }
}

impl MessageDebouncer {
    pub fn new(minimum_duration: Duration) -> Self {
        let (active, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DebouncerState::default()),
                active,
                minimum_duration,
            }),
        }
    }

    pub fn minimum_duration(&self) -> Duration {
        self.shared.minimum_duration
    }

    pub async fn add(&self, text: &str) {
        let mut state = self.shared.state.lock().await;
        state.queue.add(text, Instant::now());
        trace!(text, "Feedback message added");
        self.shared.settle(&mut state);
    }

    pub async fn remove(&self, text: &str) {
        let mut state = self.shared.state.lock().await;
        if !state
            .queue
            .remove(text, Instant::now(), self.shared.minimum_duration)
        {
            trace!(text, "Remove for unknown feedback message ignored");
        }
        self.shared.settle(&mut state);
    }

    /// The message currently on screen.
    pub fn active_message(&self) -> Option<TimedMessage> {
        self.shared.active.borrow().clone()
    }

    pub fn active_text(&self) -> Option<String> {
        self.shared
            .active
            .borrow()
            .as_ref()
            .map(|message| message.text.clone())
    }

    /// Receiver notified only when the active text changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<TimedMessage>> {
        self.shared.active.subscribe()
    }

    pub async fn messages(&self) -> Vec<TimedMessage> {
        self.shared.state.lock().await.queue.messages().to_vec()
    }

    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.state.lock().await.queue.is_empty()
    }

    /// Deadline of the pending wake, if one is armed.
    pub async fn next_wake(&self) -> Option<Instant> {
        self.shared
            .state
            .lock()
            .await
            .wake
            .as_ref()
            .map(|wake| wake.deadline)
    }
}

impl Shared {
    /// Publishes the active message and re-arms the wake for the earliest
    /// pending expiry. Must run after every mutation, under the lock.
    fn settle(self: &Arc<Self>, state: &mut DebouncerState) {
        state.queue.purge_expired(Instant::now());
        self.publish(&state.queue);
        self.rearm(state);
    }

    fn publish(&self, queue: &MessageQueue) {
        let next = queue.active().cloned();
        // Store every refresh; notify only when the visible text changes.
        self.active.send_if_modified(|current| {
            let current_text = current.as_ref().map(|message| message.text.as_str());
            let next_text = next.as_ref().map(|message| message.text.as_str());
            let changed = current_text != next_text;
            *current = next;
            changed
        });
    }

    fn rearm(self: &Arc<Self>, state: &mut DebouncerState) {
        if let Some(previous) = state.wake.take() {
            previous.handle.abort();
        }

        let Some(deadline) = state.queue.next_expiry() else {
            return;
        };

        state.wake_epoch += 1;
        let epoch = state.wake_epoch;
        let shared = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_wake(shared, epoch).await;
        });

        state.wake = Some(PendingWake {
            epoch,
            deadline,
            handle,
        });
    }
}

async fn on_wake(shared: Weak<Shared>, epoch: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut state = shared.state.lock().await;

    match state.wake.as_ref() {
        Some(wake) if wake.epoch == epoch => {
            // This task is the pending wake; detach instead of aborting itself.
            state.wake = None;
        }
        _ => {
            debug!(epoch, "Stale message wake ignored");
            return;
        }
    }

    shared.settle(&mut state);
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(wake) = self.state.get_mut().wake.take() {
            wake.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn test_added_then_removed_message_stays_for_minimum_duration() {
        let messages = MessageDebouncer::new(MIN);

        messages.add("A").await;
        messages.remove("A").await;

        tokio::time::sleep(MIN / 10).await;
        assert_eq!(messages.active_text().as_deref(), Some("A"));

        tokio::time::sleep(MIN).await;
        assert_eq!(messages.active_text(), None);
        assert!(messages.is_empty().await);
        assert_eq!(messages.next_wake().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_wake_tracks_earliest_expiry() {
        let messages = MessageDebouncer::new(MIN);
        let start = Instant::now();

        messages.add("first").await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        messages.add("second").await;

        messages.remove("second").await;
        assert_eq!(
            messages.next_wake().await,
            Some(start + Duration::from_millis(500) + MIN)
        );

        messages.remove("first").await;
        assert_eq!(messages.next_wake().await, Some(start + MIN));

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(messages.active_text().as_deref(), Some("second"));
        assert_eq!(
            messages.next_wake().await,
            Some(start + Duration::from_millis(500) + MIN)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_message_tracks_scheduled_expiry() {
        let messages = MessageDebouncer::new(MIN);
        let mut rx = messages.subscribe();

        messages.add("A").await;
        rx.borrow_and_update();
        messages.remove("A").await;

        let listed = messages.messages().await;
        let active = messages.active_message().expect("active message");
        assert_eq!(Some(&active), listed.first());
        assert!(active.end_time.is_some());
        assert!(!rx.has_changed().unwrap());

        messages.add("A").await;
        let active = messages.active_message().expect("active message");
        assert_eq!(active.end_time, None);
        assert_eq!(Some(&active), messages.messages().await.first());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readding_active_text_does_not_notify() {
        let messages = MessageDebouncer::new(MIN);
        let mut rx = messages.subscribe();

        messages.add("Move closer").await;
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        messages.remove("Move closer").await;
        messages.add("Move closer").await;
        assert!(!rx.has_changed().unwrap());

        tokio::time::sleep(MIN * 3).await;
        assert_eq!(messages.active_text().as_deref(), Some("Move closer"));
        assert_eq!(messages.len().await, 1);
    }
}
