use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::state::AppState;

/// DB health endpoint: returns 200 OK when the configured store can be
/// reached, otherwise returns 503 Service Unavailable. A nil-uuid lookup is
/// never expected to find a branch; it's a cheap round trip used purely as
/// a connectivity probe.
pub async fn db_health(State(state): State<AppState>) -> impl IntoResponse {
	match state.store.get_branch(uuid::Uuid::nil()).await {
		Ok(_) => (StatusCode::OK, "OK").into_response(),
		Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("db error: {}", e)).into_response(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Settings;
	use crate::observability::MetricsRegistry;
	use crate::store::FakeStore;
	use std::sync::Arc;

	fn state() -> AppState {
		AppState {
			store: Arc::new(FakeStore::new()),
			settings: Arc::new(Settings::default()),
			metrics: Arc::new(MetricsRegistry::new()),
		}
	}

	#[tokio::test]
	async fn health_check_returns_ok_when_store_reachable() {
		let response = db_health(State(state())).await.into_response();
		assert_eq!(response.status(), StatusCode::OK);
	}
}
