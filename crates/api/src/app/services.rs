use std::sync::Arc;

use expenseflow_infra::{
    InMemoryLedgerStore, LedgerEngine, LedgerStore, LedgerStoreError, PostgresLedgerStore,
    StoreConfig,
};

/// Shared application services handed to every handler.
pub struct AppServices {
    pub engine: LedgerEngine<Arc<dyn LedgerStore>>,
    pub backend: &'static str,
}

impl AppServices {
    pub fn new(store: Arc<dyn LedgerStore>, backend: &'static str) -> Self {
        Self {
            engine: LedgerEngine::new(store),
            backend,
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), "in_memory")
    }
}

/// Build services for the configured store backend.
pub async fn build_services(config: &StoreConfig) -> Result<AppServices, LedgerStoreError> {
    match config {
        StoreConfig::InMemory => {
            tracing::info!("using in-memory ledger store");
            Ok(AppServices::in_memory())
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresLedgerStore::connect(database_url, *max_connections).await?;
            tracing::info!(max_connections, "using postgres ledger store");
            Ok(AppServices::new(Arc::new(store), "postgres"))
        }
    }
}
