//! Fire-and-forget hooks for listeners outside the importer

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::store::{Record, RecordId};

/// Signals emitted while importing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PackageAbandoned { record: RecordId, name: String },
    PackageDeleted { record: RecordId, name: String },
    VendorDeleted { record: RecordId, name: String },
}

impl Event {
    pub fn package_abandoned(record: &Record, name: &str) -> Self {
        Event::PackageAbandoned {
            record: record.id,
            name: name.to_string(),
        }
    }

    pub fn package_deleted(record: &Record, name: &str) -> Self {
        Event::PackageDeleted {
            record: record.id,
            name: name.to_string(),
        }
    }

    pub fn vendor_deleted(record: &Record) -> Self {
        Event::VendorDeleted {
            record: record.id,
            name: record.name.clone(),
        }
    }
}

/// Receives importer signals; must not block
pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event);
}

/// Invalidates downstream caches that render a record
pub trait CacheInvalidator: Send + Sync {
    fn flush_by_tag(&self, tag: &str);
}

/// Cache tag of a package record
pub fn package_cache_tag(record: &Record) -> String {
    format!("package_{}", record.id)
}

/// Logs every event and invalidation
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: Event) {
        match event {
            Event::PackageAbandoned { name, .. } => info!("Package {} is abandoned", name),
            Event::PackageDeleted { name, .. } => info!("Package {} deleted", name),
            Event::VendorDeleted { name, .. } => info!("Vendor {} deleted", name),
        }
    }
}

impl CacheInvalidator for TracingNotifier {
    fn flush_by_tag(&self, tag: &str) {
        debug!("Flushing caches tagged {}", tag);
    }
}

/// Forwards events to an unbounded channel; a closed receiver drops them
pub struct ChannelNotifier {
    sender: UnboundedSender<Event>,
}

impl ChannelNotifier {
    pub fn new(sender: UnboundedSender<Event>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: Event) {
        if self.sender.send(event).is_err() {
            debug!("Event receiver closed, dropping event");
        }
    }
}
