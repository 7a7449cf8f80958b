//! Trailing-edge debounce on top of tokio timers.
//!
//! A burst of [`Debouncer::call`]s collapses into one run of the action with
//! the arguments of the last call, `delay` after the burst goes quiet.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::lock_unpoisoned;

type Action<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct Debouncer<T> {
    delay: Duration,
    action: Action<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(delay: Duration, action: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            delay,
            action: Arc::new(action),
            pending: Mutex::new(None),
        }
    }

    /// (Re)starts the quiet window. Outside a tokio runtime the call is
    /// logged and dropped; any pending run is left as it was.
    pub fn call(&self, args: T) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("debounced call outside a tokio runtime dropped");
            return;
        };
        let action = Arc::clone(&self.action);
        let delay = self.delay;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action(args);
        });

        if let Some(previous) = lock_unpoisoned(&self.pending).replace(timer) {
            trace!("debounce window restarted");
            previous.abort();
        }
    }

    /// Drops the pending run, if any, without firing it.
    pub fn cancel(&self) {
        if let Some(timer) = lock_unpoisoned(&self.pending).take() {
            timer.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        lock_unpoisoned(&self.pending)
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(timer) = lock_unpoisoned(&self.pending).take() {
            timer.abort();
        }
    }
}

impl<T> fmt::Debug for Debouncer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
