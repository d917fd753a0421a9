//! Builds chain-ready transactions from transfer intents.
//!
//! Token transfers rewrite into a call on the token contract carrying the
//! encoded `transfer(address,uint256)` payload; native transfers and
//! pre-built payloads pass through unchanged. Every estimation branch
//! consumes the built form, so the rewrite happens in exactly one place.

use alloy_primitives::{hex, U256};
use wallet_types::{with_0x_prefix, without_0x_prefix, ChainTransaction, TransactionToEstimate};

use super::EstimationError;

/// Selector of `transfer(address,uint256)`.
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Builds the chain-ready form of one transfer intent.
///
/// # Errors
///
/// Returns [`EstimationError::Build`] when the intent carries a payload
/// that is not valid 0x-hex.
pub fn build_transaction(
	intent: &TransactionToEstimate,
) -> Result<ChainTransaction, EstimationError> {
	if let Some(asset) = intent.asset_data.as_ref().filter(|a| !a.is_native()) {
		return Ok(ChainTransaction {
			to: asset.contract_address,
			data: encode_transfer(intent),
			value: U256::ZERO,
		});
	}

	let data = match intent.data.as_deref() {
		Some(raw) => {
			hex::decode(without_0x_prefix(raw))
				.map_err(|e| EstimationError::Build(format!("Invalid transaction data: {}", e)))?;
			with_0x_prefix(raw)
		}
		None => "0x".to_string(),
	};

	Ok(ChainTransaction {
		to: intent.to,
		data,
		value: intent.value,
	})
}

/// ABI-encodes `transfer(to, value)` as 0x-hex call data.
fn encode_transfer(intent: &TransactionToEstimate) -> String {
	let mut data = Vec::with_capacity(4 + 32 + 32);
	data.extend_from_slice(&TRANSFER_SELECTOR);
	data.extend_from_slice(&[0u8; 12]);
	data.extend_from_slice(intent.to.as_slice());
	data.extend_from_slice(&intent.value.to_be_bytes::<32>());
	format!("0x{}", hex::encode(data))
}
