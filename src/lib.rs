pub mod assembler;
pub mod auth;
pub mod config;
pub mod copier;
pub mod devops;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod merge;
pub mod observability;
pub mod permissions;
pub mod state;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{HeaderName, HeaderValue};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::sensitive_headers::{SetSensitiveRequestHeadersLayer, SetSensitiveResponseHeadersLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::observability::MetricsRegistry;
use crate::state::AppState;
use crate::store::{PgStore, Store};

/// Run forward-only SQL migrations against `pool`. Grounded on the
/// migrations directory convention; `sqlx::migrate!` embeds the `.sql` files
/// at compile time so the running binary never depends on their presence on
/// disk.
async fn run_migrations(pool: &sqlx::PgPool) -> anyhow::Result<()> {
	sqlx::migrate!("./migrations").run(pool).await?;
	Ok(())
}

/// Build the application: connect to Postgres, run migrations, and wire the
/// full axum router behind the rate limiter, security headers, and tracing
/// layers. Does not bind or serve — callers (tests, `run`) drive that.
pub async fn build_app(settings: Settings, metrics: Arc<MetricsRegistry>) -> anyhow::Result<axum::Router> {
	let pool = sqlx::postgres::PgPoolOptions::new().max_connections(10).connect(&settings.database_url).await?;
	run_migrations(&pool).await?;

	let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
	let app_state = AppState {
		store,
		settings: Arc::new(settings.clone()),
		metrics,
	};

	let req_headers: Arc<[HeaderName]> = Arc::from(vec![HeaderName::from_static("authorization")].into_boxed_slice());
	let res_headers: Arc<[HeaderName]> = Arc::from(vec![HeaderName::from_static("set-cookie")].into_boxed_slice());

	let router = handlers::build_router(app_state)
		.layer(
			ServiceBuilder::new()
				.layer(CatchPanicLayer::new())
				.layer(TraceLayer::new_for_http())
				.layer(NormalizePathLayer::trim_trailing_slash())
				.layer(TimeoutLayer::new(Duration::from_secs(30)))
				.layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
				.layer(devops::SharedRateLimitLayer::new(settings.rate_limit_burst as usize, settings.rate_limit_rps))
				.layer(SetSensitiveRequestHeadersLayer::from_shared(req_headers))
				.layer(SetSensitiveResponseHeadersLayer::from_shared(res_headers))
				.layer(SetResponseHeaderLayer::if_not_present(
					HeaderName::from_static("strict-transport-security"),
					HeaderValue::from_static("max-age=63072000; includeSubDomains; preload"),
				))
				.layer(SetResponseHeaderLayer::if_not_present(
					HeaderName::from_static("x-frame-options"),
					HeaderValue::from_static("DENY"),
				))
				.layer(SetResponseHeaderLayer::if_not_present(
					HeaderName::from_static("x-content-type-options"),
					HeaderValue::from_static("nosniff"),
				))
				.layer(SetResponseHeaderLayer::if_not_present(
					HeaderName::from_static("referrer-policy"),
					HeaderValue::from_static("strict-origin-when-cross-origin"),
				)),
		);

	Ok(router)
}

/// Start the HTTP server. Initializes observability, loads settings, connects
/// to Postgres (retrying while the container comes up, per
/// `TBN_DB_CONNECT_RETRIES` / `TBN_DB_CONNECT_BACKOFF_MS`), and serves until
/// the process is killed.
pub async fn run() {
	let obs_state = match observability::init_observability().await {
		Ok(s) => s,
		Err(e) => {
			eprintln!("warning: failed to initialize observability: {}", e);
			observability::ObservabilityState::default()
		}
	};

	let settings = match config::load() {
		Ok(s) => s,
		Err(e) => {
			eprintln!("warning: failed to load config: {}", e);
			Settings::default()
		}
	};

	let max_retries: u32 = std::env::var("TBN_DB_CONNECT_RETRIES").ok().and_then(|s| s.parse().ok()).unwrap_or(30);
	let backoff_ms: u64 = std::env::var("TBN_DB_CONNECT_BACKOFF_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(1000);

	let mut last_err = None;
	let mut router = None;
	for attempt in 1..=max_retries {
		match build_app(settings.clone(), obs_state.metrics.clone()).await {
			Ok(r) => {
				router = Some(r);
				break;
			}
			Err(e) => {
				tracing::warn!(attempt, max_retries, error = %e, "failed to build app (database not ready?)");
				last_err = Some(e);
				if attempt < max_retries {
					tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
				}
			}
		}
	}

	let Some(router) = router else {
		tracing::error!(
			error = %last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string()),
			"giving up after {} attempts to build the app",
		);
		return;
	};

	let bind_addr: SocketAddr = match format!("{}:{}", settings.host, settings.port).parse() {
		Ok(a) => a,
		Err(e) => {
			tracing::error!(error = %e, "invalid listen address");
			return;
		}
	};

	let listener = match tokio::net::TcpListener::bind(bind_addr).await {
		Ok(l) => l,
		Err(e) => {
			tracing::error!(error = %e, addr = %bind_addr, "failed to bind");
			return;
		}
	};

	tracing::info!(addr = %bind_addr, "tabulon listening");

	if let Err(e) = axum::serve(listener, router).await {
		tracing::error!(error = %e, "server error");
	}
}
