use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::AppSettings;
use crate::engine::Session;
use crate::error::DashboardError;
use crate::provider::DataProvider;
use crate::types::Symbol;

/// Shared handles for the HTTP handlers.
///
/// One session per process: every client sees the same predictor, including
/// weight changes made by another client's online update.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    pub provider: Arc<dyn DataProvider>,
    pub settings: Arc<AppSettings>,
}

impl AppState {
    pub fn new(session: Session, provider: Arc<dyn DataProvider>, settings: AppSettings) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            provider,
            settings: Arc::new(settings),
        }
    }

    /// Requested symbol, or the configured default when none was given.
    pub fn symbol(&self, requested: Option<&str>) -> Result<Symbol, DashboardError> {
        requested
            .unwrap_or(self.settings.general.default_symbol.as_str())
            .parse()
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn history_years(&self) -> u32 {
        self.settings.general.history_years
    }
}
