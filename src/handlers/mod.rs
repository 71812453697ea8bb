//! HTTP surface: wires every handler module onto an axum `Router` and splits
//! the public auth routes from the bearer-token-gated application routes,
//! matching `middleware_auth.go`'s blanket wrapper in the original (there,
//! every non-auth route is wrapped in `middlewareAuth`).

pub mod auth;
pub mod branches;
pub mod columns;
pub mod dto;
pub mod projects;
pub mod sheets;

use axum::extract::State;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::state::AppState;

async fn metrics(State(state): State<AppState>) -> String {
	state.metrics.encode()
}

pub fn build_router(state: AppState) -> Router {
	let public = Router::new()
		.route("/register", post(auth::register))
		.route("/login", post(auth::login))
		.route("/refresh", post(auth::refresh))
		.route("/revoke", post(auth::revoke))
		.route("/health", get(|| async { "OK" }))
		.route("/health/db", get(crate::health::db_health))
		.route("/metrics", get(metrics));

	let protected = Router::new()
		.route("/create_project", post(projects::create_project))
		.route("/get_project/{table_id}", get(projects::get_project))
		.route("/rename_project", put(projects::rename_project))
		.route("/delete_project", delete(projects::delete_project))
		.route("/change_game_url", put(projects::change_game_url))
		.route("/add_share", post(projects::add_share))
		.route("/create_branch", post(branches::create_branch))
		.route("/get_branch/{branch_id}", get(branches::get_branch))
		.route("/update_branch", put(branches::update_branch))
		.route("/delete_branch", delete(branches::delete_branch))
		.route("/merge_targets", get(branches::merge_targets))
		.route("/merge_preview", post(branches::merge_preview))
		.route("/merge_execute", post(branches::merge_execute))
		.route("/create_sheet", post(sheets::create_sheet))
		.route("/rename_sheet", put(sheets::rename_sheet))
		.route("/delete_sheet", delete(sheets::delete_sheet))
		.route("/get_json/{branch_id}", get(sheets::get_json))
		.route("/add_column", post(columns::add_column))
		.route("/update_column", put(columns::update_column))
		.route("/delete_column", delete(columns::delete_column))
		.route("/swap_columns", post(columns::swap_columns))
		.route("/add_column_data", post(columns::add_column_data))
		.route("/update_column_data", put(columns::update_column_data))
		.route("/delete_row", delete(columns::delete_row))
		.route_layer(middleware::from_fn_with_state(state.clone(), crate::auth::require_auth));

	public.merge(protected).with_state(state)
}
