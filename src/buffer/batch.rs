use crate::domain::LogEvent;

/// Events materialized from a queue for one upload attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    events: Vec<LogEvent>,
}

impl Batch {
    pub fn new(events: Vec<LogEvent>) -> Self {
        Self { events }
    }

    /// Total accounted size in bytes, per-event overhead included.
    pub fn size(&self) -> usize {
        self.events.iter().map(LogEvent::size).sum()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }

    /// Stable ascending sort; the Logs API rejects out-of-order batches.
    pub fn sort_by_timestamp(&mut self) {
        self.events.sort_by_key(|event| event.timestamp_millis);
    }

    /// Oldest and newest timestamps, if any.
    pub fn time_span(&self) -> Option<(i64, i64)> {
        let min = self.events.iter().map(|e| e.timestamp_millis).min()?;
        let max = self.events.iter().map(|e| e.timestamp_millis).max()?;
        Some((min, max))
    }
}

impl From<Vec<LogEvent>> for Batch {
    fn from(events: Vec<LogEvent>) -> Self {
        Self::new(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EVENT_OVERHEAD;

    #[test]
    fn test_message_sorting() {
        let mut batch = Batch::new(vec![LogEvent::new("", 2), LogEvent::new("", 1)]);
        batch.sort_by_timestamp();

        let timestamps: Vec<i64> = batch.events().iter().map(|e| e.timestamp_millis).collect();
        assert_eq!(timestamps, vec![1, 2]);
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let mut batch = Batch::new(vec![
            LogEvent::new("b1", 5),
            LogEvent::new("a", 3),
            LogEvent::new("b2", 5),
            LogEvent::new("c", 1),
            LogEvent::new("b3", 5),
        ]);

        batch.sort_by_timestamp();
        let once = batch.clone();
        batch.sort_by_timestamp();

        assert_eq!(batch, once);
        let messages: Vec<&str> = batch.events().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["c", "a", "b1", "b2", "b3"]);
    }

    #[test]
    fn test_batch_size() {
        let batch = Batch::new(vec![
            LogEvent::new("123456", 0),
            LogEvent::new("12345", 0),
            LogEvent::new("123", 0),
        ]);

        assert_eq!(batch.size(), (6 + 5 + 3) + EVENT_OVERHEAD * 3);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_empty_batch() {
        let batch = Batch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.size(), 0);
        assert_eq!(batch.time_span(), None);
    }

    #[test]
    fn test_time_span() {
        let batch = Batch::new(vec![
            LogEvent::new("", 40),
            LogEvent::new("", 10),
            LogEvent::new("", 25),
        ]);
        assert_eq!(batch.time_span(), Some((10, 40)));
    }
}
