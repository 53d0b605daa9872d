//! Task-local storage.
//!
//! Two access styles, matching the two usage patterns:
//!
//! - [`TaskLocal`] — a statically declared, typed slot. Slot numbers come
//!   from a process-wide monotonic counter; the first read of an
//!   uninitialized slot default-constructs the value in place.
//! - [`set_task_local`] / [`get_task_local`] / [`is_task_local_set`] —
//!   string-keyed dynamic storage.
//!
//! Both operate on the current task's storage, which is reset between
//! bodies. Off-task they fall back to a per-thread map, so values written
//! outside any task stay visible on that thread only.

use crate::scheduler;
use crate::task::LocalStore;

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

static NEXT_SLOT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Fallback storage used when no task is executing.
    static OFF_TASK: RefCell<LocalStore> = RefCell::new(LocalStore::new());
}

fn with_store<R>(f: impl FnOnce(&mut LocalStore) -> R) -> R {
    match scheduler::current_task_slot() {
        Some(slot) => {
            let mut locals = slot.locals.borrow_mut();
            f(&mut locals)
        }
        None => OFF_TASK.with(|store| f(&mut store.borrow_mut())),
    }
}

/// A statically allocated task-local slot.
///
/// ```no_run
/// use strand_runtime::TaskLocal;
///
/// static REQUEST_DEPTH: TaskLocal<u32> = TaskLocal::new();
///
/// REQUEST_DEPTH.set(3);
/// assert_eq!(REQUEST_DEPTH.get(), 3);
/// ```
pub struct TaskLocal<T> {
    slot: OnceLock<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Default + 'static> TaskLocal<T> {
    /// Declare a slot. Usable in `static` position.
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
            _marker: PhantomData,
        }
    }

    fn slot(&self) -> usize {
        *self
            .slot
            .get_or_init(|| NEXT_SLOT.fetch_add(1, Ordering::Relaxed))
    }

    /// Access the value, default-constructing it on first use.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let slot = self.slot();
        with_store(|store| {
            let entry = store.slot_mut(slot);
            if entry.is_none() {
                *entry = Some(Box::new(T::default()));
            }
            let value = entry
                .as_mut()
                .and_then(|boxed| boxed.downcast_mut::<T>())
                .expect("task-local slot holds a value of a different type");
            f(value)
        })
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.with(|slot| *slot = value);
    }

    /// Copy the value out.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(|slot| slot.clone())
    }
}

impl<T: Default + 'static> Default for TaskLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Store a value under a string key in the current task's storage (or the
/// thread's off-task storage).
pub fn set_task_local<T: 'static>(key: &str, value: T) {
    with_store(|store| store.keyed_set(key.to_owned(), Box::new(value)));
}

/// Read a value stored with [`set_task_local`].
///
/// # Panics
///
/// Panics if the key is unset or holds a value of a different type; check
/// with [`is_task_local_set`] first when unsure.
pub fn get_task_local<T: Clone + 'static>(key: &str) -> T {
    with_store(|store| {
        store
            .keyed_get(key)
            .unwrap_or_else(|| panic!("task-local key {key:?} is not set"))
            .downcast_ref::<T>()
            .unwrap_or_else(|| panic!("task-local key {key:?} holds a different type"))
            .clone()
    })
}

/// Whether [`set_task_local`] has stored a value under `key` in the current
/// storage.
pub fn is_task_local_set(key: &str) -> bool {
    with_store(|store| store.keyed_contains(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    static COUNTER: TaskLocal<u64> = TaskLocal::new();

    #[test]
    fn typed_slot_defaults_on_first_read() {
        assert_eq!(COUNTER.get(), 0);
        COUNTER.set(7);
        assert_eq!(COUNTER.get(), 7);
        COUNTER.with(|v| *v += 1);
        assert_eq!(COUNTER.get(), 8);
    }

    #[test]
    fn keyed_storage_off_task() {
        assert!(!is_task_local_set("answer"));
        set_task_local("answer", 42u32);
        assert!(is_task_local_set("answer"));
        assert_eq!(get_task_local::<u32>("answer"), 42);
    }

    #[test]
    #[should_panic(expected = "is not set")]
    fn unset_key_panics() {
        let _: u32 = get_task_local("never-written");
    }
}
