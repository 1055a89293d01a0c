//! Subscription storage for broadcast and one-shot delivery.
//!
//! [`Registry`] keeps two tables: broadcast subscribers keyed by
//! [`KindTag`] and one-shot subscribers keyed by [`OperationHandle`].
//! Each table stores its subscribers in a generation-checked arena and
//! keeps an ordered list of [`SlotKey`]s per key, so delivery order is
//! registration order and a key is dropped as soon as its list empties.
//!
//! # Threading
//!
//! The registry is single-threaded (`Rc<RefCell<..>>`). No borrow is
//! held across a call into subscriber code: lookups return owned
//! snapshots, so callbacks may freely register, unregister or rebind
//! while a dispatch is in progress.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::arena::{Arena, SlotKey};
use super::{KindTag, OperationHandle};
use crate::error::DispatchError;

/// Receiver of every event of one kind.
pub trait BroadcastSubscriber: fmt::Debug {
    /// Kind tag this subscriber listens to.
    fn kind(&self) -> KindTag;

    /// Decodes `raw` and runs the user callback.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::PayloadSizeMismatch`] if `raw` is too
    /// small for the subscriber's shape.
    fn deliver(&self, raw: &[u8]) -> Result<(), DispatchError>;
}

/// Receiver of the result of one specific asynchronous operation.
pub trait OneShotSubscriber: fmt::Debug {
    /// Byte size of the expected result payload.
    fn payload_size(&self) -> usize;

    /// Kind tag of the expected result payload.
    fn kind(&self) -> KindTag;

    /// Delivers a fetched result to the registration identified by `key`.
    ///
    /// Returns `Ok(false)` without running user code when `key` is no
    /// longer this subscriber's current registration (it was cancelled
    /// or rebound after the group was taken).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::PayloadSizeMismatch`] if `raw` is too
    /// small for the subscriber's shape.
    fn resolve(&self, key: SlotKey, raw: &[u8], io_failure: bool) -> Result<bool, DispatchError>;

    /// Marks the registration identified by `key` as gone without
    /// delivering anything.
    fn expire(&self, key: SlotKey);
}

#[derive(Debug)]
struct BroadcastTable {
    slots: Arena<Rc<dyn BroadcastSubscriber>>,
    by_kind: HashMap<KindTag, Vec<SlotKey>>,
}

impl BroadcastTable {
    fn new() -> Self {
        Self {
            slots: Arena::new(),
            by_kind: HashMap::new(),
        }
    }
}

#[derive(Debug)]
struct OneShotEntry {
    handle: OperationHandle,
    subscriber: Rc<dyn OneShotSubscriber>,
}

#[derive(Debug)]
struct OneShotTable {
    slots: Arena<OneShotEntry>,
    by_handle: HashMap<OperationHandle, Vec<SlotKey>>,
}

impl OneShotTable {
    fn new() -> Self {
        Self {
            slots: Arena::new(),
            by_handle: HashMap::new(),
        }
    }
}

/// Ordered snapshot of broadcast subscribers for one kind.
pub type BroadcastSnapshot = Vec<(SlotKey, Rc<dyn BroadcastSubscriber>)>;

/// Ordered group of one-shot subscribers taken for one handle.
pub type OneShotGroup = Vec<(SlotKey, Rc<dyn OneShotSubscriber>)>;

/// Subscription registry shared by channels and a dispatcher.
///
/// Cloning is cheap and yields a handle to the same tables.
/// [`Registry::sibling`] yields a registry that shares the broadcast
/// table but owns a separate one-shot table, which is how a second
/// transport (a game server) plugs into the same kind-keyed delivery.
#[derive(Clone)]
pub struct Registry {
    broadcast: Rc<RefCell<BroadcastTable>>,
    one_shot: Rc<RefCell<OneShotTable>>,
}

impl Registry {
    /// Creates a registry with empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            broadcast: Rc::new(RefCell::new(BroadcastTable::new())),
            one_shot: Rc::new(RefCell::new(OneShotTable::new())),
        }
    }

    /// Creates a registry sharing this one's broadcast table with a
    /// fresh, independent one-shot table.
    #[must_use]
    pub fn sibling(&self) -> Self {
        Self {
            broadcast: Rc::clone(&self.broadcast),
            one_shot: Rc::new(RefCell::new(OneShotTable::new())),
        }
    }

    /// Returns `true` if both registries deliver broadcasts from the
    /// same table.
    #[must_use]
    pub fn shares_broadcast_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.broadcast, &other.broadcast)
    }

    /// Appends a broadcast subscriber under its kind.
    pub fn register_broadcast(&self, subscriber: Rc<dyn BroadcastSubscriber>) -> SlotKey {
        let kind = subscriber.kind();
        let mut table = self.broadcast.borrow_mut();
        let key = table.slots.insert(subscriber);
        table.by_kind.entry(kind).or_default().push(key);
        tracing::trace!(%kind, slot = key.index(), "broadcast subscriber registered");
        key
    }

    /// Removes a broadcast subscriber.
    ///
    /// Returns `false` if `key` is stale or was never registered, which
    /// makes a second unregister during teardown harmless.
    pub fn unregister_broadcast(&self, key: SlotKey) -> bool {
        // Dropped after the borrow ends; its drop may re-enter the registry.
        let removed = {
            let mut table = self.broadcast.borrow_mut();
            let Some(subscriber) = table.slots.remove(key) else {
                return false;
            };
            let kind = subscriber.kind();
            if let Some(keys) = table.by_kind.get_mut(&kind) {
                keys.retain(|k| *k != key);
                if keys.is_empty() {
                    table.by_kind.remove(&kind);
                }
            }
            subscriber
        };
        tracing::trace!(kind = %removed.kind(), slot = key.index(), "broadcast subscriber unregistered");
        true
    }

    /// Returns `true` while `key` still refers to a registered subscriber.
    #[must_use]
    pub fn is_broadcast_live(&self, key: SlotKey) -> bool {
        self.broadcast.borrow().slots.contains(key)
    }

    /// Returns the subscribers for `kind` in registration order.
    ///
    /// The result is an owned snapshot; later registry changes do not
    /// affect it.
    #[must_use]
    pub fn lookup_broadcast(&self, kind: KindTag) -> BroadcastSnapshot {
        let table = self.broadcast.borrow();
        table
            .by_kind
            .get(&kind)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| table.slots.get(*key).map(|sub| (*key, Rc::clone(sub))))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of broadcast subscribers registered for `kind`.
    #[must_use]
    pub fn broadcast_count(&self, kind: KindTag) -> usize {
        self.broadcast
            .borrow()
            .by_kind
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Number of kinds with at least one broadcast subscriber.
    #[must_use]
    pub fn kind_count(&self) -> usize {
        self.broadcast.borrow().by_kind.len()
    }

    /// Total number of broadcast subscribers across all kinds.
    #[must_use]
    pub fn broadcast_total(&self) -> usize {
        self.broadcast.borrow().slots.len()
    }

    /// Appends a one-shot subscriber under `handle`.
    ///
    /// A subscriber already bound elsewhere must be unregistered from its
    /// old handle first; [`crate::channel::CallResult`] does this itself.
    pub fn register_one_shot(
        &self,
        subscriber: Rc<dyn OneShotSubscriber>,
        handle: OperationHandle,
    ) -> SlotKey {
        let mut table = self.one_shot.borrow_mut();
        let key = table.slots.insert(OneShotEntry { handle, subscriber });
        table.by_handle.entry(handle).or_default().push(key);
        tracing::trace!(%handle, slot = key.index(), "one-shot subscriber registered");
        key
    }

    /// Removes a one-shot subscriber registered under `handle`.
    ///
    /// Returns `false` if `key` is stale or belongs to another handle.
    pub fn unregister_one_shot(&self, key: SlotKey, handle: OperationHandle) -> bool {
        let removed = {
            let mut table = self.one_shot.borrow_mut();
            if table.slots.get(key).is_none_or(|entry| entry.handle != handle) {
                return false;
            }
            let removed = table.slots.remove(key);
            if let Some(keys) = table.by_handle.get_mut(&handle) {
                keys.retain(|k| *k != key);
                if keys.is_empty() {
                    table.by_handle.remove(&handle);
                }
            }
            removed
        };
        drop(removed);
        tracing::trace!(%handle, slot = key.index(), "one-shot subscriber unregistered");
        true
    }

    /// Removes and returns every subscriber waiting on `handle`, in
    /// registration order.
    #[must_use]
    pub fn take_one_shot(&self, handle: OperationHandle) -> OneShotGroup {
        let mut table = self.one_shot.borrow_mut();
        let Some(keys) = table.by_handle.remove(&handle) else {
            return Vec::new();
        };
        keys.into_iter()
            .filter_map(|key| table.slots.remove(key).map(|entry| (key, entry.subscriber)))
            .collect()
    }

    /// Removes every one-shot registration, returning them in slot order.
    #[must_use]
    pub fn clear_one_shot(&self) -> OneShotGroup {
        let mut table = self.one_shot.borrow_mut();
        table.by_handle.clear();
        table
            .slots
            .drain()
            .into_iter()
            .map(|(key, entry)| (key, entry.subscriber))
            .collect()
    }

    /// Number of one-shot subscribers waiting on `handle`.
    #[must_use]
    pub fn one_shot_count(&self, handle: OperationHandle) -> usize {
        self.one_shot
            .borrow()
            .by_handle
            .get(&handle)
            .map_or(0, Vec::len)
    }

    /// Handles with at least one waiting subscriber, in ascending order.
    #[must_use]
    pub fn pending_handles(&self) -> Vec<OperationHandle> {
        let mut handles: Vec<_> = self.one_shot.borrow().by_handle.keys().copied().collect();
        handles.sort_unstable();
        handles
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.kind_count())
            .field("broadcast_subscribers", &self.broadcast_total())
            .field("pending_handles", &self.one_shot.borrow().by_handle.len())
            .finish()
    }
}
