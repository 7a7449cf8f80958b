//! Authoritative `{center, zoom}` state, independent of any map widget.
//!
//! Values are stored as given; range checks belong to whoever writes them
//! (see [`crate::map_sync`] for the clamp applied before the widget moves).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::capabilities::{KvBackend, Storage};
use crate::model::{LngLat, ViewportState};
use crate::MAP_STATE_KEY;

/// Cheap to clone; all clones share one state.
#[derive(Debug, Clone)]
pub struct ViewportStore {
    tx: Arc<watch::Sender<ViewportState>>,
}

impl ViewportStore {
    pub fn new(initial: ViewportState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Loads the last persisted view, falling back to the defaults.
    pub fn restore<B: KvBackend>(storage: &Storage<B>) -> Self {
        Self::new(storage.get_or(MAP_STATE_KEY, ViewportState::default()))
    }

    pub fn persist<B: KvBackend>(&self, storage: &Storage<B>) {
        storage.set(MAP_STATE_KEY, &self.get());
    }

    pub fn get(&self) -> ViewportState {
        *self.tx.borrow()
    }

    pub fn center(&self) -> LngLat {
        self.tx.borrow().center
    }

    pub fn zoom(&self) -> f64 {
        self.tx.borrow().zoom
    }

    pub fn set_center(&self, center: LngLat) {
        self.apply(center, None);
    }

    pub fn set_zoom(&self, zoom: f64) {
        self.tx.send_if_modified(|state| {
            if state.zoom == zoom {
                return false;
            }
            state.zoom = zoom;
            true
        });
    }

    /// Center always updates; zoom only when given. Subscribers see one
    /// combined change.
    pub fn set_view(&self, center: LngLat, zoom: Option<f64>) {
        self.apply(center, zoom);
    }

    /// Change signal covering both center and zoom. The current value counts
    /// as already seen.
    pub fn subscribe(&self) -> watch::Receiver<ViewportState> {
        self.tx.subscribe()
    }

    fn apply(&self, center: LngLat, zoom: Option<f64>) {
        let changed = self.tx.send_if_modified(|state| {
            let mut changed = false;
            if state.center != center {
                state.center = center;
                changed = true;
            }
            if let Some(zoom) = zoom {
                if state.zoom != zoom {
                    state.zoom = zoom;
                    changed = true;
                }
            }
            changed
        });
        if changed {
            debug!(center = %center, zoom = ?zoom, "viewport updated");
        }
    }
}

impl Default for ViewportStore {
    fn default() -> Self {
        Self::new(ViewportState::default())
    }
}
