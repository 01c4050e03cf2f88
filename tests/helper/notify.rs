//! Recording notifier

use std::sync::Mutex;

use marketplace_sync::sync::{CacheInvalidator, Event, Notifier};

/// Keeps every event and flushed cache tag in order
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
    flushed: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn flushed_tags(&self) -> Vec<String> {
        self.flushed.lock().unwrap().clone()
    }

    pub fn abandoned_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::PackageAbandoned { .. }))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl CacheInvalidator for RecordingNotifier {
    fn flush_by_tag(&self, tag: &str) {
        self.flushed.lock().unwrap().push(tag.to_string());
    }
}
