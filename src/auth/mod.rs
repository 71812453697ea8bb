//! Bearer-token authentication: JWT issuance/validation and password hashing
//! (self-issued, no external IdP — see [`jwt`]), plus the Axum middleware
//! that resolves a request's bearer token into a `CurrentUser` extension for
//! handlers to pull out of the request. Grounded on
//! `middleware_auth.go`'s `middlewareAuth` wrapper: extract bearer token,
//! validate it, hand the resolved user id to the wrapped handler.

pub mod jwt;
pub mod password;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated user id, inserted into request extensions by
/// [`require_auth`] and pulled out by handlers via `Extension<CurrentUser>`.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

fn extract_bearer_token(request: &Request) -> Result<&str, AppError> {
	let header = request
		.headers()
		.get(AUTHORIZATION)
		.ok_or_else(|| AppError::Authentication("missing Authorization header".to_string()))?;
	let value = header
		.to_str()
		.map_err(|_| AppError::Authentication("Authorization header is not valid UTF-8".to_string()))?;
	value
		.strip_prefix("Bearer ")
		.map(str::trim)
		.filter(|t| !t.is_empty())
		.ok_or_else(|| AppError::Authentication("Authorization header is not a bearer token".to_string()))
}

/// `axum::middleware::from_fn_with_state` auth gate: resolves the bearer
/// token into a user id and inserts [`CurrentUser`] into the request, or
/// rejects with 401 before the handler runs.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, AppError> {
	let token = extract_bearer_token(&request)?;
	let user_id = jwt::validate_token(token, &state.settings.jwt_secret)?;
	request.extensions_mut().insert(CurrentUser(user_id));
	Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request as HttpRequest;

	#[test]
	fn extracts_bearer_token() {
		let request = HttpRequest::builder().header(AUTHORIZATION, "Bearer abc.def.ghi").body(Body::empty()).unwrap();
		assert_eq!(extract_bearer_token(&request).unwrap(), "abc.def.ghi");
	}

	#[test]
	fn rejects_missing_header() {
		let request = HttpRequest::builder().body(Body::empty()).unwrap();
		assert!(extract_bearer_token(&request).is_err());
	}

	#[test]
	fn rejects_non_bearer_scheme() {
		let request = HttpRequest::builder().header(AUTHORIZATION, "Basic abc123").body(Body::empty()).unwrap();
		assert!(extract_bearer_token(&request).is_err());
	}
}
