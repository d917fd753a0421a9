//! String formatting utilities.
//!
//! Provides functions for formatting strings for display, including hex
//! string prefix management, token amount formatting, hash comparison and
//! truncation for readability.

/// Utility function to truncate a hex string for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 8 {
		id.to_string()
	} else {
		format!("{}..", &id[..8])
	}
}

/// Adds "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes "0x" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Compares two transaction or batch hashes case-insensitively.
///
/// History records mix backend batch hashes, mined transaction hashes and
/// locally generated placeholders, so hashes are kept as strings and every
/// comparison goes through here.
pub fn same_hash(a: &str, b: &str) -> bool {
	a.eq_ignore_ascii_case(b)
}

/// Formats a token amount with decimal places for display.
///
/// Converts a raw smallest-unit amount (as stored on-chain) to a
/// human-readable format with proper decimal placement.
///
/// # Arguments
///
/// * `amount` - The raw token amount as a decimal string
/// * `decimals` - The number of decimal places for the token
///
/// # Returns
///
/// A formatted string like "1.5" or "1000"
pub fn format_token_amount(amount: &str, decimals: u8) -> String {
	if decimals == 0 {
		return amount.to_string();
	}

	let decimal_places = decimals as usize;

	// Handle amounts smaller than 1 token
	let (integer_part, decimal_part) = if amount.len() <= decimal_places {
		// Pad with leading zeros
		let decimal_str = format!("{:0>width$}", amount, width = decimal_places);
		("0".to_string(), decimal_str)
	} else {
		// Split at the decimal point
		let split_pos = amount.len() - decimal_places;
		(
			amount[..split_pos].to_string(),
			amount[split_pos..].to_string(),
		)
	};

	// Remove trailing zeros from decimal part for cleaner display
	let decimal_trimmed = decimal_part.trim_end_matches('0');

	if decimal_trimmed.is_empty() {
		integer_part
	} else {
		format!("{}.{}", integer_part, decimal_trimmed)
	}
}
