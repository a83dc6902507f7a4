use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, Shared, WeakShared};

use crate::Result;
use crate::request::DedupKey;
use crate::response::Payload;
use crate::util::lock_unpoisoned;

/// Pending result shared by every caller joined on one request.
pub type SharedOutcome = Shared<BoxFuture<'static, Result<Payload>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

struct InFlightEntry {
    id: EntryId,
    outcome: WeakShared<BoxFuture<'static, Result<Payload>>>,
}

/// Map from dedup key to the single live request for that key.
///
/// Entries hold weak handles: once every caller has dropped its handle the
/// pending request is dropped too, and its [`ReleaseOnDrop`] guard removes
/// the entry. The lock is never held across an `.await`.
#[derive(Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<DedupKey, InFlightEntry>>,
    next_id: AtomicU64,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live outcome registered under `key`, if any.
    pub fn acquire(&self, key: &DedupKey) -> Option<SharedOutcome> {
        let entries = lock_unpoisoned(&self.entries);
        entries.get(key).and_then(|entry| entry.outcome.upgrade())
    }

    /// Stores `outcome` under `key`, replacing any previous entry.
    pub fn register(&self, key: DedupKey, outcome: &SharedOutcome) -> EntryId {
        let id = self.allocate_id();
        self.insert(key, id, outcome);
        id
    }

    /// Removes the entry for `key` if it is still the one identified by `id`.
    pub fn release(&self, key: &DedupKey, id: EntryId) -> bool {
        let mut entries = lock_unpoisoned(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.id == id => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Joins the live outcome for `key`, or builds and registers a new one in
    /// the same critical section. The flag is `true` when an existing outcome
    /// was joined.
    ///
    /// `make` must not touch the registry.
    pub fn acquire_or_register<F>(&self, key: DedupKey, make: F) -> (SharedOutcome, bool)
    where
        F: FnOnce(EntryId) -> SharedOutcome,
    {
        let mut entries = lock_unpoisoned(&self.entries);
        if let Some(existing) = entries.get(&key).and_then(|entry| entry.outcome.upgrade()) {
            return (existing, true);
        }

        let id = self.allocate_id();
        let outcome = make(id);
        if let Some(weak) = outcome.downgrade() {
            entries.insert(key, InFlightEntry { id, outcome: weak });
        }
        (outcome, false)
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocate_id(&self) -> EntryId {
        EntryId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, key: DedupKey, id: EntryId, outcome: &SharedOutcome) {
        if let Some(weak) = outcome.downgrade() {
            lock_unpoisoned(&self.entries).insert(key, InFlightEntry { id, outcome: weak });
        }
    }
}

impl std::fmt::Debug for InFlightRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("InFlightRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

/// Releases a registry entry when the request owning it settles or is
/// dropped, whichever comes first.
pub(crate) struct ReleaseOnDrop {
    registry: Arc<InFlightRegistry>,
    key: DedupKey,
    id: EntryId,
}

impl ReleaseOnDrop {
    pub(crate) fn new(registry: Arc<InFlightRegistry>, key: DedupKey, id: EntryId) -> Self {
        Self { registry, key, id }
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.id);
    }
}
