// Observer registry - an append-only list of revocable callbacks
//
// Every Component and every Property owns one registry. The registry stores
// callbacks in a Vec<Option<Arc<F>>>:
// - observe() appends and hands out a Handle bound to the slot index
// - Handle::release() nulls the slot, indices of other slots never move
// - notify() visits the slots that existed when the pass started
//
// The Vec is guarded by a parking_lot Mutex that is only held to push, null
// or clone a single slot. Callbacks always run with the lock released, so a
// callback may register new observers or release any handle (its own
// included) without deadlocking.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Callback type of component registries.
pub type Callback = dyn Fn() + Send + Sync;

/// Registry of observer callbacks with a notify-all operation.
///
/// `F` is the (usually unsized) callback type; components use the default
/// `dyn Fn() + Send + Sync`, [`Property`](crate::Property) uses a callback
/// receiving the old and the new value.
///
/// # Usage
/// ```ignore
/// let observers: Observers = Observers::new();
/// let handle = observers.observe(Arc::new(|| println!("changed")));
///
/// observers.notify(|observer| observer());  // prints "changed"
/// handle.release();
/// observers.notify(|observer| observer());  // prints nothing
/// ```
pub struct Observers<F: ?Sized = Callback> {
    slots: Arc<Slots<F>>,
}

struct Slots<F: ?Sized> {
    /// Append-only. Released observers are set to None, never removed.
    observers: Mutex<Vec<Option<Arc<F>>>>,
}

/// Type-erased access to a registry, so a [`Handle`] does not need to know
/// the callback type of the registry it points into.
trait ReleaseSlot: Send + Sync {
    /// Null the slot at `index`. Returns true if the slot was occupied.
    fn release_slot(&self, index: usize) -> bool;

    /// Whether the slot at `index` is empty.
    fn is_vacant(&self, index: usize) -> bool;
}

impl<F: ?Sized + Send + Sync> ReleaseSlot for Slots<F> {
    fn release_slot(&self, index: usize) -> bool {
        let mut observers = self.observers.lock();
        observers
            .get_mut(index)
            .and_then(Option::take)
            .is_some()
    }

    fn is_vacant(&self, index: usize) -> bool {
        let observers = self.observers.lock();
        observers.get(index).is_none_or(Option::is_none)
    }
}

impl<F: ?Sized + Send + Sync + 'static> Observers<F> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Slots {
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register `observer` to be called on every following [`notify`](Self::notify).
    ///
    /// Registrations are never deduplicated: observing the same callback twice
    /// occupies two slots and calls it twice per pass.
    pub fn observe(&self, observer: Arc<F>) -> Handle {
        let index = {
            let mut observers = self.slots.observers.lock();
            observers.push(Some(observer));
            observers.len() - 1
        };

        let slots: Weak<dyn ReleaseSlot> = Arc::downgrade(&self.slots) as Weak<dyn ReleaseSlot>;
        Handle {
            slots: Some(slots),
            index,
        }
    }

    /// Call `invoke` for every observer registered before this call started.
    ///
    /// Observers are visited in registration order and each live one exactly
    /// once. The number of slots is captured up front, so observers added
    /// during the pass wait for the next one. A slot released during the pass
    /// is skipped if it has not been reached yet.
    ///
    /// A panicking observer aborts the pass and propagates to the caller; the
    /// remaining observers are not visited.
    pub fn notify(&self, mut invoke: impl FnMut(&F)) {
        let length = self.slots.observers.lock().len();

        for index in 0..length {
            // Clone the slot out so the lock is not held while the observer runs
            let observer = self.slots.observers.lock().get(index).cloned().flatten();

            if let Some(observer) = observer {
                invoke(&*observer);
            }
        }
    }

    /// Number of observers that have not been released
    pub fn live_count(&self) -> usize {
        self.slots
            .observers
            .lock()
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Number of slots ever allocated (released ones included)
    pub fn len(&self) -> usize {
        self.slots.observers.lock().len()
    }

    /// Whether no observer was ever registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Observers<Callback> {
    /// Call every registered `Fn()` observer.
    pub fn invalidate(&self) {
        self.notify(|observer| observer());
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for Observers<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Observers<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("slots", &self.slots.observers.lock().len())
            .finish()
    }
}

/// Revocable reference to one registered observer.
///
/// Releasing is idempotent and never fails. Clones refer to the same slot, so
/// releasing any clone releases the observer. A handle does not keep its
/// registry alive; releasing after the registry was dropped is a no-op.
#[derive(Clone)]
pub struct Handle {
    slots: Option<Weak<dyn ReleaseSlot>>,
    index: usize,
}

impl Handle {
    /// A handle that refers to no observer. Releasing it does nothing.
    pub fn detached() -> Self {
        Self {
            slots: None,
            index: 0,
        }
    }

    /// Remove the observer from its registry.
    ///
    /// Safe to call from inside the observer itself while it is being notified.
    pub fn release(&self) {
        let Some(slots) = self.slots.as_ref().and_then(Weak::upgrade) else {
            return;
        };

        if slots.release_slot(self.index) {
            tracing::trace!(index = self.index, "observer released");
        }
    }

    /// Whether the observer is gone (released, detached, or registry dropped)
    pub fn is_released(&self) -> bool {
        match self.slots.as_ref().and_then(Weak::upgrade) {
            Some(slots) => slots.is_vacant(self.index),
            None => true,
        }
    }

    /// Slot index of the observer in its registry
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.index)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<Callback> {
        let log = log.clone();
        Arc::new(move || log.lock().push(name))
    }

    #[test]
    fn released_observer_is_skipped() {
        let observers: Observers = Observers::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _o1 = observers.observe(recorder(&log, "o1"));
        let o2 = observers.observe(recorder(&log, "o2"));
        let _o3 = observers.observe(recorder(&log, "o3"));

        o2.release();
        observers.invalidate();

        assert_eq!(*log.lock(), vec!["o1", "o3"]);
    }

    #[test]
    fn release_is_idempotent() {
        let observers: Observers = Observers::new();
        let first = observers.observe(Arc::new(|| {}));
        let second = observers.observe(Arc::new(|| {}));

        first.release();
        first.release();
        first.clone().release();

        assert!(first.is_released());
        assert!(!second.is_released());
        assert_eq!(observers.live_count(), 1);
        // Releasing never shifts the other slots
        assert_eq!(second.index(), 1);
        assert_eq!(observers.len(), 2);
    }

    #[test]
    fn observers_added_during_pass_wait_for_next_pass() {
        let observers: Arc<Observers> = Arc::new(Observers::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let registry = observers.clone();
        let late = late_calls.clone();
        let _outer = observers.observe(Arc::new(move || {
            let late = late.clone();
            // Dropping a handle does not release its observer
            let _ = registry.observe(Arc::new(move || {
                late.fetch_add(1, Ordering::Relaxed);
            }));
        }));

        observers.invalidate();
        assert_eq!(late_calls.load(Ordering::Relaxed), 0);

        observers.invalidate();
        assert_eq!(late_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn observer_can_release_itself_during_notify() {
        let observers: Observers = Observers::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let own_handle = Arc::new(Mutex::new(Handle::detached()));

        let counter = calls.clone();
        let slot = own_handle.clone();
        let handle = observers.observe(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            slot.lock().clone().release();
            slot.lock().clone().release();
        }));
        *own_handle.lock() = handle.clone();

        observers.invalidate();
        observers.invalidate();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(handle.is_released());
    }

    #[test]
    fn observer_releasing_a_later_one_prevents_its_call() {
        let observers: Observers = Observers::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let victim = Arc::new(Mutex::new(Handle::detached()));

        let target = victim.clone();
        let first_log = log.clone();
        let _first = observers.observe(Arc::new(move || {
            first_log.lock().push("first");
            target.lock().release();
        }));
        *victim.lock() = observers.observe(recorder(&log, "second"));

        observers.invalidate();

        assert_eq!(*log.lock(), vec!["first"]);
    }

    #[test]
    fn panicking_observer_halts_the_pass() {
        let observers: Observers = Observers::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _o1 = observers.observe(recorder(&log, "o1"));
        let _boom = observers.observe(Arc::new(|| panic!("observer failed")));
        let _o3 = observers.observe(recorder(&log, "o3"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            observers.invalidate();
        }));

        assert!(result.is_err());
        assert_eq!(*log.lock(), vec!["o1"]);
    }

    #[test]
    fn handle_outliving_registry_is_inert() {
        let observers: Observers = Observers::new();
        let handle = observers.observe(Arc::new(|| {}));
        drop(observers);

        handle.release();
        assert!(handle.is_released());
        assert!(Handle::detached().is_released());
    }

    #[test]
    fn typed_callbacks_receive_arguments() {
        let observers: Observers<dyn Fn(&u32, &u32) + Send + Sync> = Observers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _handle = observers.observe(Arc::new(move |old: &u32, new: &u32| {
            sink.lock().push((*old, *new));
        }));

        observers.notify(|observer| observer(&1, &2));
        assert_eq!(*seen.lock(), vec![(1, 2)]);
    }

    #[test]
    fn concurrent_registration_keeps_every_slot() {
        let observers: Arc<Observers> = Arc::new(Observers::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let observers = observers.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let calls = calls.clone();
                        let handle = observers.observe(Arc::new(move || {
                            calls.fetch_add(1, Ordering::Relaxed);
                        }));
                        if i % 2 == 0 {
                            handle.release();
                        }
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(observers.len(), 800);
        assert_eq!(observers.live_count(), 400);

        observers.invalidate();
        assert_eq!(calls.load(Ordering::Relaxed), 400);
    }
}
