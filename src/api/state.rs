use crate::analysis::forecast::ForecastEngine;
use crate::analysis::stats::StatsEngine;
use crate::notify::Notifier;
use crate::storage::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub stats: Arc<StatsEngine>,
    pub forecast: Arc<ForecastEngine>,
    pub notifier: Notifier,
    /// Window applied when a request does not name one.
    pub default_window_hours: i64,
}
