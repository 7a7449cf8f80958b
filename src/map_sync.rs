//! Two-way bridge between a live map widget's camera and a [`ViewportStore`].
//!
//! Two paths keep the widget and the store eventually consistent:
//!
//! * **Map → Store.** Every camera-move notification restarts a trailing
//!   debounce of `sync_delay`. When it fires, the widget's camera is written
//!   into the store as one combined `set_view`.
//! * **Store → Map.** A watcher task observes the store's combined
//!   center+zoom signal. A target that differs from the widget's camera is
//!   applied with an immediate `jump_to` while the sync guard is held.
//!
//! A jump makes the widget emit its own move notification, synchronously and
//! inside the `jump_to` call. Such a move arrives while the guard is held and is
//! dropped without scheduling a write, so a store-originated jump never echoes
//! back into the store.
//!
//! Both directions compare and write [`ViewportState::normalized`] views, so a
//! widget that reports an unwrapped longitude after crossing the antimeridian
//! does not get pushed back to a different position.
//!
//! Widgets report events through a [`MapEventSink`]. [`Synchronizer::initialize`]
//! needs a tokio runtime; move events raised outside one are logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::Settings;
use crate::debounce::Debouncer;
use crate::lock_unpoisoned;
use crate::model::{LngLat, ViewportState};
use crate::viewport::ViewportStore;
use crate::{DEFAULT_MAP_STYLE, MAX_ZOOM, MIN_ZOOM, SYNC_DELAY};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("synchronizer is {0:?}, expected Uninitialized")]
    InvalidState(SyncState),

    #[error("failed to create map widget: {0}")]
    Creation(String),

    #[error("no tokio runtime available to drive map synchronization")]
    NoRuntime,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    /// The widget is being created.
    Initializing,
    Active,
    Destroyed,
}

/// Notifications a widget reports about itself.
#[derive(Clone, Debug, PartialEq)]
pub enum MapEvent {
    /// The camera moved, whether by gesture or by `jump_to`.
    Move,
    Load,
    /// Tile, style or other rendering failure.
    Error(String),
}

/// Construction parameters handed to [`MapWidgetFactory::create`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    pub style: String,
    pub access_token: String,
    pub center: LngLat,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub navigation_control: bool,
    pub fullscreen_control: bool,
}

impl MapOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            style: settings.map_style.clone(),
            access_token: settings.access_token.clone(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_view(mut self, view: ViewportState) -> Self {
        self.center = view.center;
        self.zoom = view.zoom;
        self
    }
}

impl Default for MapOptions {
    fn default() -> Self {
        let view = ViewportState::default();
        Self {
            style: DEFAULT_MAP_STYLE.to_string(),
            access_token: String::new(),
            center: view.center,
            zoom: view.zoom,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            navigation_control: true,
            fullscreen_control: true,
        }
    }
}

/// A live map instance. Owned exclusively by the [`Synchronizer`].
pub trait MapWidget: Send + 'static {
    fn camera(&self) -> ViewportState;

    /// Moves the camera immediately, without animation.
    fn jump_to(&mut self, target: ViewportState);

    /// Tears the widget down. Called once, during cleanup.
    fn remove(self)
    where
        Self: Sized;
}

pub trait MapWidgetFactory: Send + Sync + 'static {
    /// Whatever the host mounts the widget into.
    type Container;
    type Widget: MapWidget;

    fn create(
        &self,
        container: Self::Container,
        options: MapOptions,
        events: MapEventSink,
    ) -> Result<Self::Widget, MapError>;
}

trait EventTarget: Send + Sync {
    fn handle(&self, event: MapEvent);
    fn is_applying_store_update(&self) -> bool;
}

/// Where a widget reports its [`MapEvent`]s.
///
/// Holds only a weak reference, so events emitted after the synchronizer is
/// gone are ignored.
#[derive(Clone)]
pub struct MapEventSink {
    target: Weak<dyn EventTarget>,
}

impl MapEventSink {
    pub fn emit(&self, event: MapEvent) {
        if let Some(target) = self.target.upgrade() {
            target.handle(event);
        }
    }

    /// True while a store-originated jump is in progress.
    pub fn is_applying_store_update(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.is_applying_store_update())
    }
}

impl std::fmt::Debug for MapEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapEventSink")
            .field("attached", &(self.target.strong_count() > 0))
            .finish()
    }
}

/// Holds the "applying store update" flag for exactly one jump.
///
/// Released on drop, so the flag clears even if `jump_to` panics.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

struct Shared<W> {
    widget: Mutex<Option<W>>,
    store: ViewportStore,
    state: Mutex<SyncState>,
    applying_store_update: AtomicBool,
    camera_sync: Debouncer<()>,
}

impl<W: MapWidget> Shared<W> {
    fn state(&self) -> SyncState {
        *lock_unpoisoned(&self.state)
    }

    /// Map → Store. The debounce timer body.
    fn sync_camera(&self) {
        if self.applying_store_update.load(Ordering::SeqCst) {
            trace!("camera sync skipped: store update in progress");
            return;
        }
        let camera = match lock_unpoisoned(&self.widget).as_ref() {
            Some(widget) => widget.camera().normalized(),
            None => {
                trace!("camera sync skipped: no widget");
                return;
            }
        };
        debug!(center = %camera.center, zoom = camera.zoom, "syncing camera to store");
        self.store.set_view(camera.center, Some(camera.zoom));
    }

    /// Store → Map.
    fn apply_store_update(&self, target: ViewportState) {
        let target = target.normalized();
        let mut slot = lock_unpoisoned(&self.widget);
        let Some(widget) = slot.as_mut() else {
            return;
        };
        if widget.camera().normalized() == target {
            return;
        }

        debug!(center = %target.center, zoom = target.zoom, "applying store update to map");
        let _guard = SyncGuard::engage(&self.applying_store_update);
        widget.jump_to(target);
    }
}

impl<W: MapWidget> EventTarget for Shared<W> {
    fn handle(&self, event: MapEvent) {
        match event {
            MapEvent::Move => {
                if self.applying_store_update.load(Ordering::SeqCst) {
                    trace!("move during store update suppressed");
                    return;
                }
                if self.state() == SyncState::Active {
                    self.camera_sync.call(());
                }
            }
            MapEvent::Load => info!("map loaded"),
            MapEvent::Error(message) => error!(error = %message, "map error"),
        }
    }

    fn is_applying_store_update(&self) -> bool {
        self.applying_store_update.load(Ordering::SeqCst)
    }
}

/// Read-only view of the synchronizer's widget for sibling consumers.
///
/// Camera writes must go through the store.
pub struct MapHandle<W> {
    shared: Weak<Shared<W>>,
}

impl<W: MapWidget> MapHandle<W> {
    /// `None` before initialization and after cleanup.
    pub fn camera(&self) -> Option<ViewportState> {
        let shared = self.shared.upgrade()?;
        let camera = lock_unpoisoned(&shared.widget).as_ref().map(MapWidget::camera);
        camera
    }

    pub fn is_available(&self) -> bool {
        self.camera().is_some()
    }
}

impl<W> Clone for MapHandle<W> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<W> std::fmt::Debug for MapHandle<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapHandle").finish_non_exhaustive()
    }
}

/// Owns one map widget and keeps it in sync with a [`ViewportStore`].
///
/// Lifecycle: `Uninitialized` → [`initialize`](Self::initialize) → `Active`
/// → [`cleanup`](Self::cleanup) → `Destroyed`. Cleanup is idempotent and
/// also runs on drop.
pub struct Synchronizer<F: MapWidgetFactory> {
    factory: F,
    options: MapOptions,
    shared: Arc<Shared<F::Widget>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<F: MapWidgetFactory> Synchronizer<F> {
    pub fn new(factory: F, store: ViewportStore) -> Self {
        Self::with_options(factory, store, MapOptions::default(), SYNC_DELAY)
    }

    pub fn with_settings(factory: F, store: ViewportStore, settings: &Settings) -> Self {
        Self::with_options(
            factory,
            store,
            MapOptions::from_settings(settings),
            settings.sync_delay(),
        )
    }

    /// `options.center` and `options.zoom` are replaced by the store's view
    /// at initialization.
    pub fn with_options(
        factory: F,
        store: ViewportStore,
        options: MapOptions,
        sync_delay: Duration,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared<F::Widget>>| {
            let weak = weak.clone();
            Shared {
                widget: Mutex::new(None),
                store,
                state: Mutex::new(SyncState::Uninitialized),
                applying_store_update: AtomicBool::new(false),
                camera_sync: Debouncer::new(sync_delay, move |()| {
                    if let Some(shared) = weak.upgrade() {
                        shared.sync_camera();
                    }
                }),
            }
        });

        Self {
            factory,
            options,
            shared,
            watcher: Mutex::new(None),
        }
    }

    /// Creates the widget at the store's current view, attaches its event
    /// sink and starts watching the store.
    ///
    /// A [`cleanup`](Self::cleanup) that lands while the widget is being
    /// created wins: the new widget is removed and `InvalidState(Destroyed)`
    /// is returned.
    pub fn initialize(&self, container: F::Container) -> Result<(), MapError> {
        let runtime = Handle::try_current().map_err(|_| MapError::NoRuntime)?;
        {
            let mut state = lock_unpoisoned(&self.shared.state);
            let current = *state;
            if current != SyncState::Uninitialized {
                warn!(state = ?current, "initialize called in wrong state");
                return Err(MapError::InvalidState(current));
            }
            *state = SyncState::Initializing;
        }

        // Subscribe before reading so writes made during creation are seen.
        let mut changes = self.shared.store.subscribe();
        let view = changes.borrow_and_update().normalized();
        let options = self.options.clone().with_view(view);
        let shared: Arc<dyn EventTarget> = self.shared.clone();
        let events = MapEventSink {
            target: Arc::downgrade(&shared),
        };
        drop(shared);

        let widget = match self.factory.create(container, options, events) {
            Ok(widget) => widget,
            Err(e) => {
                let mut state = lock_unpoisoned(&self.shared.state);
                if *state == SyncState::Initializing {
                    *state = SyncState::Uninitialized;
                }
                return Err(e);
            }
        };
        *lock_unpoisoned(&self.shared.widget) = Some(widget);

        let mut state = lock_unpoisoned(&self.shared.state);
        if *state == SyncState::Destroyed {
            drop(state);
            let widget = lock_unpoisoned(&self.shared.widget).take();
            if let Some(widget) = widget {
                widget.remove();
            }
            warn!("synchronizer destroyed during initialization");
            return Err(MapError::InvalidState(SyncState::Destroyed));
        }
        *state = SyncState::Active;

        let weak = Arc::downgrade(&self.shared);
        let watcher = runtime.spawn(async move {
            while changes.changed().await.is_ok() {
                let target = *changes.borrow_and_update();
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.apply_store_update(target);
            }
        });
        *lock_unpoisoned(&self.watcher) = Some(watcher);
        drop(state);

        info!(center = %view.center, zoom = view.zoom, "map synchronizer active");
        Ok(())
    }

    /// Destroys the widget, then cancels the pending camera sync and stops
    /// the store watcher. Repeated calls do nothing.
    pub fn cleanup(&self) {
        {
            let mut state = lock_unpoisoned(&self.shared.state);
            if *state == SyncState::Destroyed {
                return;
            }
            *state = SyncState::Destroyed;
        }

        let widget = lock_unpoisoned(&self.shared.widget).take();
        if let Some(widget) = widget {
            widget.remove();
        }
        self.shared.camera_sync.cancel();
        if let Some(watcher) = lock_unpoisoned(&self.watcher).take() {
            watcher.abort();
        }

        info!("map synchronizer destroyed");
    }

    pub fn state(&self) -> SyncState {
        self.shared.state()
    }

    pub fn store(&self) -> &ViewportStore {
        &self.shared.store
    }

    pub fn map_handle(&self) -> MapHandle<F::Widget> {
        MapHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn is_applying_store_update(&self) -> bool {
        self.shared.applying_store_update.load(Ordering::SeqCst)
    }

    pub fn is_sync_pending(&self) -> bool {
        self.shared.camera_sync.is_pending()
    }

    /// Runs the Map → Store step now, exactly as the debounce timer would.
    pub fn sync_camera_now(&self) {
        self.shared.sync_camera();
    }
}

impl<F: MapWidgetFactory> Drop for Synchronizer<F> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<F: MapWidgetFactory> std::fmt::Debug for Synchronizer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
