use std::sync::Arc;
use flightsearch_core::SearchSession;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SearchSession>,
}

impl AppState {
    pub fn new(session: SearchSession) -> Self {
        Self { session: Arc::new(session) }
    }
}
