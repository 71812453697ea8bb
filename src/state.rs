use std::sync::Arc;

use crate::config::Settings;
use crate::observability::MetricsRegistry;
use crate::store::Store;

/// Application state passed to handlers via Axum's `State` extractor.
///
/// Holds the shared storage backend, the settings needed to issue/validate
/// access tokens, and the metrics registry.
#[derive(Clone)]
pub struct AppState {
	pub store: Arc<dyn Store>,
	pub settings: Arc<Settings>,
	pub metrics: Arc<MetricsRegistry>,
}
