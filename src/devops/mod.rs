pub mod rate_limiter;

pub use rate_limiter::SharedRateLimitLayer;

#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn mod_compiles() {
		let _ = 1 + 1;
	}
}
