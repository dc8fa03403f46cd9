use crate::observer::{Handle, Observers};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type ChangeCallback<T> = dyn Fn(&T, &T) + Send + Sync;

struct PropertyInner<T> {
    value: Mutex<T>,
    observers: Observers<ChangeCallback<T>>,
}

/// Observable value.
///
/// Observers receive the old and the new value after every [`set`](Property::set)
/// that actually changed the value. Clones share the same value.
///
/// # Usage
/// ```ignore
/// let expanded = Property::new(false);
/// let handle = expanded.observe(|old, new| println!("{old} -> {new}"));
///
/// expanded.set(true);   // prints "false -> true"
/// expanded.set(true);   // unchanged, prints nothing
/// handle.release();
/// ```
pub struct Property<T> {
    inner: Arc<PropertyInner<T>>,
}

impl<T> Property<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Create a property holding `value`
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                value: Mutex::new(value),
                observers: Observers::new(),
            }),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    /// Store `value` and notify observers if it differs from the current one.
    ///
    /// Returns whether the value changed. Observers run after the value is
    /// stored, without any lock held.
    pub fn set(&self, value: T) -> bool {
        let old = {
            let mut current = self.inner.value.lock();
            if *current == value {
                return false;
            }
            std::mem::replace(&mut *current, value.clone())
        };

        self.inner.observers.notify(|observer| observer(&old, &value));
        true
    }

    /// Register `observer` for value changes
    pub fn observe(&self, observer: impl Fn(&T, &T) + Send + Sync + 'static) -> Handle {
        self.inner.observers.observe(Arc::new(observer))
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Default + Clone + PartialEq + Send + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}
