#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use place_sense::capabilities::{HttpRequest, HttpResult, HttpTransport};
use place_sense::{
    LngLat, MapError, MapEvent, MapEventSink, MapOptions, MapWidget, MapWidgetFactory,
    ViewportState, ViewportStore,
};

/// Shared between the test body and the widget the synchronizer owns.
#[derive(Default)]
pub struct MockMap {
    camera: Mutex<ViewportState>,
    sink: Mutex<Option<MapEventSink>>,
    jumps: Mutex<Vec<ViewportState>>,
    guard_during_jump: Mutex<Vec<bool>>,
    created_with: Mutex<Option<MapOptions>>,
    removed: AtomicUsize,
}

impl MockMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn camera(&self) -> ViewportState {
        *self.camera.lock().unwrap()
    }

    /// A user gesture: the camera moves and the widget reports it.
    pub fn drag_to(&self, center: LngLat, zoom: f64) {
        *self.camera.lock().unwrap() = ViewportState::new(center, zoom);
        self.emit(MapEvent::Move);
    }

    pub fn emit(&self, event: MapEvent) {
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }

    pub fn jumps(&self) -> Vec<ViewportState> {
        self.jumps.lock().unwrap().clone()
    }

    pub fn guard_during_jump(&self) -> Vec<bool> {
        self.guard_during_jump.lock().unwrap().clone()
    }

    pub fn created_with(&self) -> Option<MapOptions> {
        self.created_with.lock().unwrap().clone()
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }
}

pub struct MockWidget(Arc<MockMap>);

impl MapWidget for MockWidget {
    fn camera(&self) -> ViewportState {
        self.0.camera()
    }

    /// Emits its move notification before returning, like a real renderer.
    fn jump_to(&mut self, target: ViewportState) {
        *self.0.camera.lock().unwrap() = target;
        self.0.jumps.lock().unwrap().push(target);

        let sink = self.0.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            self.0
                .guard_during_jump
                .lock()
                .unwrap()
                .push(sink.is_applying_store_update());
            sink.emit(MapEvent::Move);
        }
    }

    fn remove(self) {
        self.0.removed.fetch_add(1, Ordering::SeqCst);
        self.0.sink.lock().unwrap().take();
    }
}

pub struct MockFactory(pub Arc<MockMap>);

impl MapWidgetFactory for MockFactory {
    type Container = ();
    type Widget = MockWidget;

    fn create(
        &self,
        _container: (),
        options: MapOptions,
        events: MapEventSink,
    ) -> Result<MockWidget, MapError> {
        *self.0.camera.lock().unwrap() = ViewportState::new(options.center, options.zoom);
        *self.0.created_with.lock().unwrap() = Some(options);
        *self.0.sink.lock().unwrap() = Some(events);
        Ok(MockWidget(Arc::clone(&self.0)))
    }
}

/// Counts store change notifications from a background task.
pub fn count_store_writes(store: &ViewportStore) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            changes.borrow_and_update();
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });
    count
}

/// Lets spawned tasks run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Never answers; only a timeout ends the request.
pub struct StalledTransport {
    pub calls: AtomicUsize,
}

impl StalledTransport {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HttpTransport for StalledTransport {
    async fn execute(&self, _request: &HttpRequest) -> HttpResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}
