//! # Observer Lists
//!
//! Start/stop loading hooks registered on the controller. Every observer is
//! called for every event, in registration order; a panicking observer is
//! logged and skipped so the rest still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

pub type Observer<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct ObserverList<T: Clone> {
    observers: Mutex<Vec<Observer<T>>>,
    name: &'static str,
}

impl<T: Clone> ObserverList<T> {
    /// `name` identifies the list in log messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            name,
        }
    }

    pub fn register(&self, observer: impl Fn(T) + Send + Sync + 'static) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Arc::new(observer));
        }
    }

    /// Calls every observer with a clone of `value`.
    pub fn notify(&self, value: T) {
        // Snapshot so observers may register further observers
        let snapshot: Vec<Observer<T>> = match self.observers.lock() {
            Ok(observers) => observers.clone(),
            Err(_) => return,
        };

        for (index, observer) in snapshot.iter().enumerate() {
            let arg = value.clone();
            if catch_unwind(AssertUnwindSafe(|| observer(arg))).is_err() {
                tracing::error!(target: "hooks", "{} observer #{index} panicked", self.name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
