use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::DispatchSettings;
use crate::connections::ConnectionRegistry;
use crate::observability::metrics::Metrics;
use crate::store::{DispatchStore, GeoIndex, MemoryStore};

pub struct AppState {
    pub store: Arc<dyn DispatchStore>,
    pub geo: Arc<dyn GeoIndex>,
    pub connections: ConnectionRegistry,
    pub match_tx: mpsc::Sender<Uuid>,
    pub settings: DispatchSettings,
    pub metrics: Metrics,
}

impl AppState {
    /// State backed by a fresh in-memory store. The receiver feeds the
    /// matching worker.
    pub fn new(settings: DispatchSettings) -> (Self, mpsc::Receiver<Uuid>) {
        let store = Arc::new(MemoryStore::new());
        Self::with_backend(store.clone(), store, settings)
    }

    pub fn with_backend(
        store: Arc<dyn DispatchStore>,
        geo: Arc<dyn GeoIndex>,
        settings: DispatchSettings,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (match_tx, match_rx) = mpsc::channel(settings.match_queue_size);

        (
            Self {
                store,
                geo,
                connections: ConnectionRegistry::new(),
                match_tx,
                settings,
                metrics: Metrics::new(),
            },
            match_rx,
        )
    }
}
