//! Registration, login, refresh, and revoke. Grounded on
//! `examples/original_source/backend/{register,login,refresh,revoke}.go`.
//! Unlike the original's cookie-based refresh token, this service returns
//! the refresh token in the JSON body — see DESIGN.md for why.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::issue_token;
use crate::auth::password::{hash_password, verify_password};
use crate::domain::User;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::dto::IdName;

const REFRESH_TOKEN_TTL_DAYS: i64 = 60;

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
	pub email: String,
	pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
	pub id: Uuid,
	pub email: String,
}

pub async fn register(State(state): State<AppState>, Json(params): Json<RegisterParams>) -> AppResult<(StatusCode, Json<UserResponse>)> {
	if !params.email.contains('@') {
		return Err(AppError::Validation("provided email is not valid".to_string()));
	}
	let hashed = hash_password(&params.password)?;
	let user = state.store.create_user(&params.email, &hashed).await?;
	Ok((StatusCode::CREATED, Json(UserResponse { id: user.id, email: user.email })))
}

#[derive(Debug, Deserialize)]
pub struct LoginParams {
	pub email: String,
	pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
	pub email: String,
	pub token: String,
	pub refresh_token: String,
	pub opened_sheet: Option<Uuid>,
	pub table_names: Vec<IdName>,
}

pub async fn login(State(state): State<AppState>, Json(params): Json<LoginParams>) -> AppResult<(StatusCode, Json<LoginResponse>)> {
	let user = state
		.store
		.get_user_by_email(&params.email)
		.await?
		.ok_or_else(|| AppError::Authentication("invalid email or password".to_string()))?;
	if !verify_password(&params.password, &user.password_hash)? {
		return Err(AppError::Authentication("invalid email or password".to_string()));
	}
	issue_session(&state, &user, StatusCode::OK).await
}

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
	pub refresh_token: String,
}

pub async fn refresh(State(state): State<AppState>, Json(params): Json<RefreshParams>) -> AppResult<(StatusCode, Json<LoginResponse>)> {
	let token = state
		.store
		.get_refresh_token(&params.refresh_token)
		.await?
		.ok_or_else(|| AppError::Authentication("unknown refresh token".to_string()))?;
	if token.revoked_at.is_some() {
		return Err(AppError::Authentication("refresh token has been revoked".to_string()));
	}
	if token.expires_at <= Utc::now() {
		return Err(AppError::Authentication("refresh token has expired".to_string()));
	}
	let user = state
		.store
		.get_user_by_id(token.user_id)
		.await?
		.ok_or_else(|| AppError::Authentication("user for refresh token no longer exists".to_string()))?;
	issue_session(&state, &user, StatusCode::OK).await
}

pub async fn revoke(State(state): State<AppState>, Json(params): Json<RefreshParams>) -> AppResult<StatusCode> {
	state.store.revoke_refresh_token(&params.refresh_token).await?;
	Ok(StatusCode::NO_CONTENT)
}

/// Issue an access token plus a fresh refresh token for `user`, and collect
/// the same `table_names` summary `ReturnLoginData` sends back. Does not
/// resolve `opened_sheet` into a full sheet view — handlers that need one
/// open a project/branch explicitly via their own switch flow.
async fn issue_session(state: &AppState, user: &User, code: StatusCode) -> AppResult<(StatusCode, Json<LoginResponse>)> {
	let token = issue_token(user.id, &state.settings.jwt_secret, state.settings.access_token_ttl_secs)?;

	let refresh_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
	let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);
	state.store.create_refresh_token(&refresh_token, user.id, expires_at).await?;

	let projects = state.store.list_projects_for_user(user.id).await?;
	let table_names = projects.into_iter().map(|p| IdName { id: p.id, name: p.name }).collect();

	Ok((
		code,
		Json(LoginResponse {
			email: user.email.clone(),
			token,
			refresh_token,
			opened_sheet: user.opened_sheet,
			table_names,
		}),
	))
}
