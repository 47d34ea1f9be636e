//! Synchronous callback registry.
//!
//! Listeners are invoked on the publishing thread, in registration order.
//! The registry lock is not held while callbacks run, so a callback may
//! subscribe or unsubscribe without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Slots<T> = Mutex<Vec<(u64, Callback<T>)>>;

pub struct Listeners<T> {
    slots: Arc<Slots<T>>,
    next_id: AtomicU64,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`. It stays registered until the returned handle
    /// is dropped or [`ListenerHandle::unsubscribe`] is called.
    #[must_use = "dropping the handle unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut slots) = self.slots.lock() {
            slots.push((id, Arc::new(callback)));
        }

        let weak: Weak<Slots<T>> = Arc::downgrade(&self.slots);
        ListenerHandle {
            release: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    if let Ok(mut slots) = slots.lock() {
                        slots.retain(|(slot_id, _)| *slot_id != id);
                    }
                }
            })),
        }
    }

    /// Invoke every registered callback with `value`.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = match self.slots.lock() {
            Ok(slots) => slots.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            Err(_) => return,
        };
        for callback in snapshot {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration. Outstanding handles become no-ops.
    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> core::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

/// Keeps a listener registered. Unsubscribes on drop.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct ListenerHandle {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ListenerHandle {
    /// A handle that is not attached to anything.
    pub fn detached() -> Self {
        Self { release: None }
    }

    /// Wrap an arbitrary release action, e.g. an external provider's
    /// unsubscribe call.
    pub fn from_fn<F>(release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    /// Keep the registration alive for the life of the registry.
    pub fn forget(mut self) {
        self.release = None;
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl core::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("attached", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_run_in_registration_order() {
        let listeners = Listeners::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            listeners.subscribe(move |v| seen.lock().unwrap().push(("first", *v)))
        };
        let second = {
            let seen = Arc::clone(&seen);
            listeners.subscribe(move |v| seen.lock().unwrap().push(("second", *v)))
        };

        listeners.notify(&3);

        assert_eq!(*seen.lock().unwrap(), vec![("first", 3), ("second", 3)]);
        drop((first, second));
    }

    #[test]
    fn dropping_handle_unsubscribes() {
        let listeners = Listeners::<()>::new();
        let hits = Arc::new(AtomicU64::new(0));

        let handle = {
            let hits = Arc::clone(&hits);
            listeners.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        listeners.notify(&());
        drop(handle);
        listeners.notify(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn explicit_unsubscribe_only_removes_its_own_slot() {
        let listeners = Listeners::<()>::new();
        let a = listeners.subscribe(|_| {});
        let b = listeners.subscribe(|_| {});

        a.unsubscribe();

        assert_eq!(listeners.len(), 1);
        drop(b);
    }

    #[test]
    fn handle_outliving_registry_is_harmless() {
        let listeners = Listeners::<()>::new();
        let handle = listeners.subscribe(|_| {});
        drop(listeners);
        drop(handle);
    }

    #[test]
    fn callback_may_subscribe_while_notified() {
        let listeners = Arc::new(Listeners::<()>::new());
        let inner = Arc::clone(&listeners);
        let handle = listeners.subscribe(move |_| inner.subscribe(|_| {}).forget());

        listeners.notify(&());

        assert_eq!(listeners.len(), 2);
        drop(handle);
    }

    #[test]
    fn from_fn_runs_release_once() {
        let hits = Arc::new(AtomicU64::new(0));
        let handle = {
            let hits = Arc::clone(&hits);
            ListenerHandle::from_fn(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        handle.unsubscribe();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
