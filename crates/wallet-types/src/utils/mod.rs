//! Utility functions shared across the wallet engine.

/// String formatting helpers for amounts, hashes and hex prefixes.
pub mod formatting;

pub use formatting::{
	format_token_amount, same_hash, truncate_id, with_0x_prefix, without_0x_prefix,
};

/// Returns the current Unix timestamp in seconds, or 0 if system time is
/// before the Unix epoch.
pub fn current_timestamp() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}
