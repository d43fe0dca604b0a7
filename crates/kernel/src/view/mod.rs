//! Listing view controller.
//!
//! A [`ListingView`] owns the state one data table needs: its persisted
//! [`ViewConfig`], the current page, the last fetched response and an event
//! channel scoped to its lifetime. Refetches and exports go through a single
//! [`InFlight`] slot, so they never overlap on the same view.

mod config;
mod events;
mod guard;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::debug;

pub use config::{DEFAULT_COLUMN_WIDTH, MIN_COLUMN_WIDTH, VIEW_CONFIG_VERSION, ViewConfig};
pub use events::{ViewEvent, ViewEvents};
pub use guard::{DEFAULT_LOADING_CEILING, InFlight, InFlightGuard, LoadingGuard, LoadingState};

use crate::error::{ViewConfigError, ViewError};
use crate::export::{BulkExporter, ExportJob, ExportOutcome, ExportSettings, PageSource};
use crate::listing::types::{DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::listing::{ListResponse, QueryParams, Resource};

#[derive(Debug)]
struct ViewState {
    config: ViewConfig,
    page: u32,
    limit: u32,
    current: Option<ListResponse>,
}

pub struct ListingView {
    resource: Resource,
    source: Arc<dyn PageSource>,
    state: Mutex<ViewState>,
    events: ViewEvents,
    in_flight: InFlight,
    loading: LoadingState,
}

impl ListingView {
    pub fn new(resource: Resource, source: Arc<dyn PageSource>, config: ViewConfig) -> Self {
        Self {
            resource,
            source,
            state: Mutex::new(ViewState {
                config,
                page: DEFAULT_PAGE,
                limit: DEFAULT_LIMIT,
                current: None,
            }),
            events: ViewEvents::new(),
            in_flight: InFlight::new(),
            loading: LoadingState::default(),
        }
    }

    /// Create a view from the configuration saved at `path`.
    pub fn mount(resource: Resource, source: Arc<dyn PageSource>, path: &Path) -> Self {
        Self::new(resource, source, ViewConfig::load_or_default(path, resource))
    }

    /// Persist the configuration to `path`.
    pub fn unmount(&self, path: &Path) -> Result<(), ViewConfigError> {
        self.state.lock().config.save(path)
    }

    pub fn with_loading_state(mut self, loading: LoadingState) -> Self {
        self.loading = loading;
        self
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn config(&self) -> ViewConfig {
        self.state.lock().config.clone()
    }

    /// Edit the column layout in place.
    pub fn update_config(&self, edit: impl FnOnce(&mut ViewConfig)) {
        edit(&mut self.state.lock().config);
    }

    pub fn current(&self) -> Option<ListResponse> {
        self.state.lock().current.clone()
    }

    /// Parameters of the next listing request.
    pub fn params(&self) -> QueryParams {
        let state = self.state.lock();
        state
            .config
            .filters
            .clone()
            .with("page", state.page.to_string())
            .with("limit", state.limit.to_string())
    }

    /// Sender handle for components that signal this view.
    pub fn events(&self) -> ViewEvents {
        self.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn set_page(&self, page: u32) {
        self.state.lock().page = page.max(1);
        self.events.emit(ViewEvent::RefetchRequested);
    }

    /// Set or remove (blank `value`) one filter; returns to the first page.
    pub fn set_filter(&self, key: &str, value: &str) {
        let mut state = self.state.lock();
        if value.trim().is_empty() {
            state.config.filters.remove(key);
        } else {
            state.config.filters.set(key, value);
        }
        state.page = DEFAULT_PAGE;
        drop(state);
        self.events.emit(ViewEvent::RefetchRequested);
    }

    /// Remove every filter and announce it.
    pub fn clear_filters(&self) {
        self.reset_filters();
        self.events.emit(ViewEvent::FiltersCleared);
    }

    fn reset_filters(&self) {
        let mut state = self.state.lock();
        state.config.filters = QueryParams::new();
        state.page = DEFAULT_PAGE;
    }

    /// React to an event from the view's channel.
    pub async fn handle_event(&self, event: ViewEvent) -> Result<ListResponse, ViewError> {
        debug!(resource = %self.resource, ?event, "view event");
        if event == ViewEvent::FiltersCleared {
            self.reset_filters();
        }
        self.refetch().await
    }

    /// Fetch the current page.
    ///
    /// Fails with [`ViewError::Busy`] while another refetch or export runs.
    /// On a source error the view shows an empty page.
    pub async fn refetch(&self) -> Result<ListResponse, ViewError> {
        let _slot = self.in_flight.try_begin()?;
        let _loading = self.loading.start();

        let params = self.params();
        match self.source.fetch_page(self.resource, &params).await {
            Ok(response) => {
                self.state.lock().current = Some(response.clone());
                Ok(response)
            }
            Err(e) => {
                let mut state = self.state.lock();
                state.current = Some(ListResponse::empty(state.page, state.limit));
                Err(e.into())
            }
        }
    }

    /// Exporter sharing this view's page source.
    pub fn exporter(&self, settings: ExportSettings) -> BulkExporter {
        BulkExporter::new(self.source.clone(), settings)
    }

    /// Export the whole filtered set with the current filters.
    pub async fn export(&self, exporter: &BulkExporter) -> Result<ExportOutcome, ViewError> {
        let _slot = self.in_flight.try_begin()?;
        let _loading = self.loading.start();

        let mut job = ExportJob::new(self.resource, &self.params());
        Ok(exporter.run(&mut job).await?)
    }
}
