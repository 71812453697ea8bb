//! Self-issued HS256 access tokens. Grounded on
//! `internal/auth/make_jwt.go`/`validate_jwt.go`: a `RegisteredClaims`-style
//! subject/issuer/expiry payload, no external IdP — this service signs and
//! verifies its own tokens, adapting `sync::auth`'s use of the
//! `jsonwebtoken` crate from RS256-via-JWKS to a single shared HS256 secret.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Matches `TokenTypeAccess = "chirpy-access"` in the Go original, renamed to
/// this service's own issuer string.
pub const TOKEN_ISSUER: &str = "tabulon-access";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
	sub: String,
	iss: String,
	iat: i64,
	exp: i64,
}

pub fn issue_token(user_id: Uuid, secret: &str, ttl_secs: u64) -> AppResult<String> {
	let now = Utc::now();
	let claims = Claims {
		sub: user_id.to_string(),
		iss: TOKEN_ISSUER.to_string(),
		iat: now.timestamp(),
		exp: (now + Duration::seconds(ttl_secs as i64)).timestamp(),
	};
	encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
		.map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign access token: {e}")))
}

/// Parses and validates a bearer token, returning the subject user id.
/// Rejects tokens issued by anyone other than this service (wrong `iss`) and
/// tokens whose signature or expiry does not check out.
pub fn validate_token(token: &str, secret: &str) -> AppResult<Uuid> {
	let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
	validation.set_issuer(&[TOKEN_ISSUER]);
	validation.leeway = 0;

	let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
		.map_err(|e| AppError::Authentication(format!("invalid access token: {e}")))?;

	Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Authentication("access token subject is not a valid user id".to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_a_valid_token() {
		let user_id = Uuid::new_v4();
		let token = issue_token(user_id, "test-secret", 3600).unwrap();
		let parsed = validate_token(&token, "test-secret").unwrap();
		assert_eq!(parsed, user_id);
	}

	#[test]
	fn rejects_wrong_secret() {
		let user_id = Uuid::new_v4();
		let token = issue_token(user_id, "test-secret", 3600).unwrap();
		assert!(validate_token(&token, "other-secret").is_err());
	}

	#[test]
	fn rejects_expired_token() {
		let user_id = Uuid::new_v4();
		let token = issue_token(user_id, "test-secret", 1).unwrap();
		std::thread::sleep(std::time::Duration::from_millis(1500));
		assert!(validate_token(&token, "test-secret").is_err());
	}
}
