//! Place search as the UI drives it: type, wait for the debounce, pick a hit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::api::GeocodingClient;
use crate::capabilities::HttpTransport;
use crate::config::Settings;
use crate::debounce::Debouncer;
use crate::lock_unpoisoned;
use crate::model::{is_valid_search_query, Feature};
use crate::viewport::ViewportStore;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<Feature>,
    pub selected: Option<Feature>,
    pub is_searching: bool,
}

struct Inner<T> {
    client: GeocodingClient<T>,
    store: ViewportStore,
    state: Mutex<SearchState>,
    // Bumped by every search and every reset; a response is applied only if
    // its generation is still current.
    generation: AtomicU64,
    min_length: usize,
    limit: usize,
}

impl<T: HttpTransport> Inner<T> {
    fn invalidate(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn run(&self, query: String) {
        let generation = self.invalidate();

        if !is_valid_search_query(&query, self.min_length) {
            let mut state = lock_unpoisoned(&self.state);
            state.results.clear();
            state.is_searching = false;
            return;
        }

        lock_unpoisoned(&self.state).is_searching = true;
        let results = self.client.search(&query, self.limit).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(query = %query, "discarding results of outdated query");
            return;
        }
        let mut state = lock_unpoisoned(&self.state);
        state.results = results;
        state.is_searching = false;
    }
}

pub struct SearchSession<T> {
    inner: Arc<Inner<T>>,
    debounced: Debouncer<String>,
}

impl<T: HttpTransport + 'static> SearchSession<T> {
    pub fn new(client: GeocodingClient<T>, store: ViewportStore, settings: &Settings) -> Self {
        let inner = Arc::new(Inner {
            client,
            store,
            state: Mutex::new(SearchState::default()),
            generation: AtomicU64::new(0),
            min_length: settings.search_min_length,
            limit: settings.search_result_limit,
        });

        let weak = Arc::downgrade(&inner);
        let debounced = Debouncer::new(settings.search_debounce(), move |query: String| {
            if let Some(inner) = weak.upgrade() {
                tokio::spawn(async move { inner.run(query).await });
            }
        });

        Self { inner, debounced }
    }

    /// Records the query and schedules a debounced search. Must run inside a
    /// tokio runtime.
    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        lock_unpoisoned(&self.inner.state).query.clone_from(&query);
        self.debounced.call(query);
    }

    /// Searches for the current query right away.
    pub async fn search_now(&self) {
        self.debounced.cancel();
        let query = lock_unpoisoned(&self.inner.state).query.clone();
        self.inner.run(query).await;
    }

    /// Picks a result and moves the map there. Zoom is left as is.
    pub fn select_location(&self, feature: Feature) {
        self.debounced.cancel();
        self.inner.invalidate();
        let center = feature.center;
        info!(place = %feature.place_name, center = %center, "location selected");
        {
            let mut state = lock_unpoisoned(&self.inner.state);
            state.query.clone_from(&feature.place_name);
            state.results.clear();
            state.is_searching = false;
            state.selected = Some(feature);
        }
        self.inner.store.set_view(center, None);
    }

    pub fn clear(&self) {
        self.debounced.cancel();
        self.inner.invalidate();
        *lock_unpoisoned(&self.inner.state) = SearchState::default();
    }

    pub fn state(&self) -> SearchState {
        lock_unpoisoned(&self.inner.state).clone()
    }

    pub fn query(&self) -> String {
        lock_unpoisoned(&self.inner.state).query.clone()
    }

    pub fn results(&self) -> Vec<Feature> {
        lock_unpoisoned(&self.inner.state).results.clone()
    }

    pub fn selected(&self) -> Option<Feature> {
        lock_unpoisoned(&self.inner.state).selected.clone()
    }

    pub fn is_searching(&self) -> bool {
        lock_unpoisoned(&self.inner.state).is_searching
    }
}

impl<T> std::fmt::Debug for SearchSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("debounced", &self.debounced)
            .finish_non_exhaustive()
    }
}
