use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// A feedback message with its visibility window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMessage {
    pub id: Uuid,
    pub text: String,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
}

impl TimedMessage {
    fn new(text: &str, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            start_time: now,
            end_time: None,
        }
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        self.end_time.is_some_and(|end| now >= end)
    }
}

/// Insertion-ordered message list with an expiry index.
///
/// Every operation takes the current time explicitly; scheduling the wake is
/// left to the caller.
#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: Vec<TimedMessage>,
    expiries: BTreeSet<(Instant, Uuid)>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `text` alive: cancels a pending expiry or appends a new entry.
    pub fn add(&mut self, text: &str, now: Instant) {
        self.purge_expired(now);

        match self.entries.iter_mut().rev().find(|entry| entry.text == text) {
            Some(entry) => {
                if let Some(end) = entry.end_time.take() {
                    self.expiries.remove(&(end, entry.id));
                }
            }
            None => self.entries.push(TimedMessage::new(text, now)),
        }
    }

    /// Schedules `text` to disappear, never earlier than
    /// `start_time + minimum_duration`. Returns false for unknown text.
    pub fn remove(&mut self, text: &str, now: Instant, minimum_duration: Duration) -> bool {
        let Some(entry) = self.entries.iter_mut().rev().find(|entry| entry.text == text) else {
            return false;
        };

        let end = now.max(entry.start_time + minimum_duration);
        if let Some(previous) = entry.end_time.replace(end) {
            self.expiries.remove(&(previous, entry.id));
        }
        self.expiries.insert((end, entry.id));

        self.purge_expired(now);
        true
    }

    /// Drops every entry whose end time has passed. Returns how many went.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let mut expired = Vec::new();
        while let Some(&(end, id)) = self.expiries.first() {
            if end > now {
                break;
            }
            self.expiries.pop_first();
            expired.push(id);
        }

        if expired.is_empty() {
            return 0;
        }
        self.entries.retain(|entry| !expired.contains(&entry.id));
        expired.len()
    }

    /// Earliest pending end time, if any entry is scheduled to go.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.expiries.first().map(|(end, _)| *end)
    }

    /// Oldest surviving entry.
    pub fn active(&self) -> Option<&TimedMessage> {
        self.entries.first()
    }

    pub fn messages(&self) -> &[TimedMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(2);

    #[test]
    fn test_remove_respects_minimum_duration() {
        let start = Instant::now();
        let mut queue = MessageQueue::new();

        queue.add("Move closer", start);
        assert!(queue.remove("Move closer", start, MIN));
        assert_eq!(queue.next_expiry(), Some(start + MIN));

        queue.purge_expired(start + MIN / 10);
        assert_eq!(queue.active().map(|m| m.text.as_str()), Some("Move closer"));

        queue.purge_expired(start + MIN + MIN / 10);
        assert!(queue.active().is_none());
        assert_eq!(queue.next_expiry(), None);
    }

    #[test]
    fn test_late_remove_expires_immediately() {
        let start = Instant::now();
        let mut queue = MessageQueue::new();

        queue.add("Aim at your object", start);
        let later = start + MIN * 3;
        assert!(queue.remove("Aim at your object", later, MIN));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_readd_cancels_pending_removal() {
        let start = Instant::now();
        let mut queue = MessageQueue::new();

        queue.add("Move slower", start);
        queue.remove("Move slower", start, MIN);
        queue.add("Move slower", start + MIN / 2);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_expiry(), None);
        assert_eq!(queue.active().and_then(|m| m.end_time), None);

        queue.purge_expired(start + MIN * 5);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_active_is_oldest_survivor() {
        let start = Instant::now();
        let mut queue = MessageQueue::new();

        queue.add("first", start);
        queue.add("second", start + Duration::from_millis(100));
        queue.add("third", start + Duration::from_millis(200));
        assert_eq!(queue.active().map(|m| m.text.as_str()), Some("first"));

        queue.remove("first", start + Duration::from_millis(300), MIN);
        queue.remove("third", start + Duration::from_millis(300), MIN);
        queue.purge_expired(start + MIN + Duration::from_millis(150));
        assert_eq!(queue.active().map(|m| m.text.as_str()), Some("second"));

        let remaining: Vec<&str> = queue.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(remaining, vec!["second", "third"]);
    }

    #[test]
    fn test_remove_unknown_text_is_noop() {
        let start = Instant::now();
        let mut queue = MessageQueue::new();
        assert!(!queue.remove("nothing", start, MIN));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_repeated_remove_reschedules_single_expiry() {
        let start = Instant::now();
        let mut queue = MessageQueue::new();

        queue.add("More light required", start);
        queue.remove("More light required", start, MIN);
        queue.remove("More light required", start + MIN / 2, MIN);

        assert_eq!(queue.next_expiry(), Some(start + MIN));
        queue.purge_expired(start + MIN);
        assert!(queue.is_empty());
    }
}
