//! Record store wrappers that count or reject mutating calls

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use marketplace_sync::error::StoreError;
use marketplace_sync::store::{KindFilter, Property, Record, RecordId, RecordKind, RecordStore, Value};

pub struct CountingStore<S> {
    inner: S,
    writes: AtomicUsize,
}

impl<S: RecordStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of create/set/remove/change-kind calls so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    fn count(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl<S: RecordStore> RecordStore for CountingStore<S> {
    fn root(&self) -> Result<Record, StoreError> {
        self.inner.root()
    }

    fn find_child(&self, parent: RecordId, name: &str) -> Result<Option<Record>, StoreError> {
        self.inner.find_child(parent, name)
    }

    fn create_child(
        &self,
        parent: RecordId,
        name: &str,
        kind: RecordKind,
    ) -> Result<Record, StoreError> {
        self.count();
        self.inner.create_child(parent, name, kind)
    }

    fn get_property(&self, record: RecordId, key: Property) -> Result<Option<Value>, StoreError> {
        self.inner.get_property(record, key)
    }

    fn set_property(
        &self,
        record: RecordId,
        key: Property,
        value: Value,
    ) -> Result<(), StoreError> {
        self.count();
        self.inner.set_property(record, key, value)
    }

    fn list_children(
        &self,
        parent: RecordId,
        filter: KindFilter,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.list_children(parent, filter)
    }

    fn find_descendants(
        &self,
        ancestor: RecordId,
        filter: KindFilter,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.find_descendants(ancestor, filter)
    }

    fn remove(&self, record: RecordId) -> Result<(), StoreError> {
        self.count();
        self.inner.remove(record)
    }

    fn change_kind(&self, record: RecordId, kind: RecordKind) -> Result<(), StoreError> {
        self.count();
        self.inner.change_kind(record, kind)
    }
}

/// Rejects property writes to selected records
pub struct FailingStore<S> {
    inner: S,
    failing: Mutex<HashSet<RecordId>>,
}

impl<S: RecordStore> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every later `set_property` on `record` fail
    pub fn fail_writes_to(&self, record: RecordId) {
        self.failing.lock().unwrap().insert(record);
    }

    fn is_failing(&self, record: RecordId) -> bool {
        self.failing.lock().unwrap().contains(&record)
    }
}

impl<S: RecordStore> RecordStore for FailingStore<S> {
    fn root(&self) -> Result<Record, StoreError> {
        self.inner.root()
    }

    fn find_child(&self, parent: RecordId, name: &str) -> Result<Option<Record>, StoreError> {
        self.inner.find_child(parent, name)
    }

    fn create_child(
        &self,
        parent: RecordId,
        name: &str,
        kind: RecordKind,
    ) -> Result<Record, StoreError> {
        self.inner.create_child(parent, name, kind)
    }

    fn get_property(&self, record: RecordId, key: Property) -> Result<Option<Value>, StoreError> {
        self.inner.get_property(record, key)
    }

    fn set_property(
        &self,
        record: RecordId,
        key: Property,
        value: Value,
    ) -> Result<(), StoreError> {
        if self.is_failing(record) {
            return Err(StoreError::LockPoisoned);
        }
        self.inner.set_property(record, key, value)
    }

    fn list_children(
        &self,
        parent: RecordId,
        filter: KindFilter,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.list_children(parent, filter)
    }

    fn find_descendants(
        &self,
        ancestor: RecordId,
        filter: KindFilter,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.find_descendants(ancestor, filter)
    }

    fn remove(&self, record: RecordId) -> Result<(), StoreError> {
        self.inner.remove(record)
    }

    fn change_kind(&self, record: RecordId, kind: RecordKind) -> Result<(), StoreError> {
        self.inner.change_kind(record, kind)
    }
}
