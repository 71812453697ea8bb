//! Password hashing. Grounded on `internal/auth/hash_password.go`: bcrypt at
//! cost 10, rejecting passwords over bcrypt's 72-byte input limit.

use bcrypt::{hash, verify};

use crate::error::{AppError, AppResult};

/// Matches `bcrypt.GenerateFromPassword(password, 10)` in the Go original.
const BCRYPT_COST: u32 = 10;
const MAX_PASSWORD_BYTES: usize = 72;

pub fn hash_password(password: &str) -> AppResult<String> {
	if password.len() > MAX_PASSWORD_BYTES {
		return Err(AppError::Validation("password must be under 72 bytes".to_string()));
	}
	hash(password, BCRYPT_COST).map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
	verify(password, hash).map_err(|e| AppError::Internal(anyhow::anyhow!("failed to verify password: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hashes_and_verifies_round_trip() {
		let hashed = hash_password("correct horse battery staple").unwrap();
		assert!(verify_password("correct horse battery staple", &hashed).unwrap());
		assert!(!verify_password("wrong password", &hashed).unwrap());
	}

	#[test]
	fn rejects_passwords_over_72_bytes() {
		let long = "a".repeat(73);
		assert!(hash_password(&long).is_err());
	}
}
