use std::sync::Arc;
use std::time::Instant;

use crate::store::ExchangeStore;

#[derive(Clone)]
pub struct AppState {
    start: Instant,
    store: Arc<ExchangeStore>,
    app_name: Arc<str>,
    build_id: Arc<str>,
}

impl AppState {
    pub fn new(app_name: impl Into<Arc<str>>, build_id: impl Into<Arc<str>>) -> Self {
        Self::with_store(Arc::new(ExchangeStore::new()), app_name, build_id)
    }

    pub fn with_store(
        store: Arc<ExchangeStore>,
        app_name: impl Into<Arc<str>>,
        build_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            start: Instant::now(),
            store,
            app_name: app_name.into(),
            build_id: build_id.into(),
        }
    }

    pub fn store(&self) -> &ExchangeStore {
        &self.store
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}
