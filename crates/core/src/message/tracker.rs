//! Per-originator ordering and per-target receipt bookkeeping.
//!
//! A node owns one [MessageTracker] for flooded packets and one per directed destination.
//! The tracker is plain synchronous state, callers guard it with a lock.
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::Range;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;

/// Composite key of a tracked message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    /// did of the node that assigned `id`
    pub originator: Did,
    /// sequence id
    pub id: u64,
}

impl MessageKey {
    pub fn new(originator: Did, id: u64) -> Self {
        Self { originator, id }
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.originator, self.id)
    }
}

/// Invoked once when the receipt it waits for arrives.
pub type ResolutionHandler = Box<dyn FnOnce() + Send + Sync>;

#[derive(Default)]
struct TrackedMessage {
    receipts: HashSet<Did>,
    handlers: HashMap<Did, ResolutionHandler>,
}

/// Delivery order of one originator.
#[derive(Default, Debug, Clone)]
struct OriginState {
    /// Next expected id, everything below has been seen.
    index: u64,
    /// Ids seen ahead of `index`.
    buffer: BTreeSet<u64>,
}

/// Receipt and ordering state of one message stream.
#[derive(Default)]
pub struct MessageTracker {
    origins: HashMap<Did, OriginState>,
    messages: HashMap<MessageKey, TrackedMessage>,
    next_send_id: u64,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id of a locally originated message.
    pub fn next_send_id(&mut self) -> u64 {
        let id = self.next_send_id;
        self.next_send_id += 1;
        id
    }

    /// Record a sighting of `originator:id`.
    ///
    /// Returns None for a duplicate. Otherwise returns the range of ids that just became
    /// contiguous, which is empty when `id` arrived ahead of a gap.
    pub fn accept(&mut self, originator: Did, id: u64) -> Option<Range<u64>> {
        let state = self.origins.entry(originator).or_default();
        if id < state.index || state.buffer.contains(&id) {
            return None;
        }
        if id != state.index {
            state.buffer.insert(id);
            return Some(state.index..state.index);
        }
        let from = state.index;
        state.index += 1;
        while state.buffer.first() == Some(&state.index) {
            state.buffer.pop_first();
            state.index += 1;
        }
        Some(from..state.index)
    }

    /// Returns true exactly once per distinct `originator:id`.
    pub fn receive_message(&mut self, originator: Did, id: u64) -> bool {
        self.accept(originator, id).is_some()
    }

    /// Register `handler` to run when `target` acknowledges `key`.
    /// A handler registered earlier for the same target is replaced without being invoked.
    pub fn sent_message(&mut self, key: MessageKey, target: Did, handler: ResolutionHandler) {
        self.messages
            .entry(key)
            .or_default()
            .handlers
            .insert(target, handler);
    }

    /// Whether `originator:id` was accepted before.
    pub fn has_seen(&self, originator: Did, id: u64) -> bool {
        self.origins
            .get(&originator)
            .map(|s| id < s.index || s.buffer.contains(&id))
            .unwrap_or(false)
    }

    /// Mark `target` as having acknowledged `key`, resolving its pending handler.
    /// A receipt may arrive before the message was sent to `target`, it is kept either way.
    pub fn handle_receipt(&mut self, key: MessageKey, target: Did) {
        let message = self.messages.entry(key).or_default();
        message.receipts.insert(target);
        if let Some(handler) = message.handlers.remove(&target) {
            handler();
        }
    }

    /// Whether `target` has acknowledged `key`.
    pub fn has_receipt(&self, key: MessageKey, target: Did) -> bool {
        self.messages
            .get(&key)
            .map(|m| m.receipts.contains(&target))
            .unwrap_or(false)
    }

    /// Drop the pending handler of `target` without invoking it.
    pub fn cancel(&mut self, key: MessageKey, target: Did) -> bool {
        self.messages
            .get_mut(&key)
            .map(|m| m.handlers.remove(&target).is_some())
            .unwrap_or(false)
    }

    /// Forget receipts and handlers of `key`. Ordering state is kept.
    pub fn release(&mut self, key: MessageKey) -> bool {
        self.messages.remove(&key).is_some()
    }

    /// Whether receipts or handlers of `key` are held.
    pub fn is_tracking(&self, key: MessageKey) -> bool {
        self.messages.contains_key(&key)
    }

    /// Number of messages with receipts or handlers.
    pub fn tracked(&self) -> usize {
        self.messages.len()
    }

    /// Next id expected from `originator`.
    pub fn delivered_index(&self, originator: Did) -> u64 {
        self.origins
            .get(&originator)
            .map(|s| s.index)
            .unwrap_or_default()
    }

    /// Stop waiting for the ids of `originator` missing below `id`, which has been seen.
    ///
    /// Returns the ids that became contiguous, counted from the old index, so the caller can
    /// release whatever it held among them. Skipped ids that show up later count as duplicates.
    pub fn skip_through(&mut self, originator: Did, id: u64) -> Range<u64> {
        let Some(state) = self.origins.get_mut(&originator) else {
            return 0..0;
        };
        let from = state.index;
        if id < state.index {
            return from..from;
        }
        state.buffer = state.buffer.split_off(&id);
        state.index = id;
        while state.buffer.first() == Some(&state.index) {
            state.buffer.pop_first();
            state.index += 1;
        }
        from..state.index
    }

    /// Whether the tracker holds nothing worth keeping: no message state, no sightings and
    /// no id handed out.
    pub fn is_idle(&self) -> bool {
        self.messages.is_empty() && self.origins.is_empty() && self.next_send_id == 0
    }
}

/// Holds payloads that arrived ahead of their turn until the gap is filled.
#[derive(Debug)]
pub struct DeliveryQueue<T> {
    pending: HashMap<Did, BTreeMap<u64, T>>,
}

impl<T> Default for DeliveryQueue<T> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<T> DeliveryQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `item` until its id is released.
    pub fn hold(&mut self, key: MessageKey, item: T) {
        self.pending
            .entry(key.originator)
            .or_default()
            .insert(key.id, item);
    }

    /// Take the held items of `originator` whose ids fall in `ready`, in id order.
    pub fn release(&mut self, originator: Did, ready: Range<u64>) -> Vec<(u64, T)> {
        if ready.is_empty() {
            return vec![];
        }
        let Some(queue) = self.pending.get_mut(&originator) else {
            return vec![];
        };
        let items = ready
            .filter_map(|id| queue.remove(&id).map(|item| (id, item)))
            .collect();
        if queue.is_empty() {
            self.pending.remove(&originator);
        }
        items
    }

    /// Number of held items.
    pub fn len(&self) -> usize {
        self.pending.values().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
