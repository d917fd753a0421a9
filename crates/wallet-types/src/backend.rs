//! Payload types exchanged with the smart-wallet backend services.
//!
//! The backends are treated as black-box RPC services; these types pin
//! down the payload contracts the engine depends on: submitted batches,
//! raw fee estimates and the notification stream.

use crate::chains::TokenConfig;
use crate::transactions::TransactionFeeInfo;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Backend-reported lifecycle state of a submitted gateway batch.
///
/// States this build does not know about deserialize as [`Unknown`];
/// status mapping must stay total over that variant.
///
/// [`Unknown`]: GatewayBatchState::Unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GatewayBatchState {
	Queued,
	Sending,
	Sent,
	Reverted,
	Cancelled,
	#[serde(other)]
	Unknown,
}

/// The mined transaction behind a submitted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedTransaction {
	pub hash: String,
}

/// A batch after submission to the execution backend.
///
/// # Fields
///
/// * `hash` - Identifier assigned by the backend at submission
/// * `state` - Backend lifecycle state, mapped into the app's transaction
///   status vocabulary during reconciliation
/// * `transaction` - The mined transaction; absent until the batch reaches
///   the chain, and its hash may differ from any locally recorded
///   placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedBatch {
	pub hash: String,
	pub state: GatewayBatchState,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction: Option<SubmittedTransaction>,
}

/// Raw fee estimate returned by a smart-wallet backend.
///
/// Both backends report the same shape; normalization into
/// [`TransactionFeeInfo`](crate::TransactionFeeInfo) happens in one place
/// regardless of which backend produced the estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBatchEstimate {
	/// Gas units the backend expects the submission to consume.
	pub estimated_gas: U256,
	/// Gas price the backend will submit with, in wei.
	pub estimated_gas_price: U256,
	/// Total cost in the requested gas token's smallest unit, present only
	/// when the backend priced the submission in a gas token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_token_cost: Option<U256>,
}

impl RawBatchEstimate {
	/// Normalizes the raw estimate into the fee shape consumers read.
	///
	/// When a gas token was requested and the backend priced the submission
	/// in it, the fee is the token cost and the token rides along. In every
	/// other case, including a requested token the backend did not price,
	/// the fee falls back to gas times gas price in the native asset.
	pub fn to_fee_info(&self, gas_token: Option<TokenConfig>) -> TransactionFeeInfo {
		match (gas_token, self.gas_token_cost) {
			(Some(token), Some(cost)) => TransactionFeeInfo {
				fee: cost,
				gas_price: None,
				gas_token: Some(token),
			},
			_ => TransactionFeeInfo {
				fee: self.estimated_gas.saturating_mul(self.estimated_gas_price),
				gas_price: None,
				gas_token: None,
			},
		}
	}
}

/// One notification delivered on the backend event stream.
///
/// The stream pairs each notification with the chain it concerns. The
/// wire shape is `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BackendNotification {
	/// Account data changed on the backend; no payload fields are consumed
	/// beyond the type.
	AccountUpdated,
	/// A submitted batch changed state; `hash` is the batch hash.
	GatewayBatchUpdated { hash: String },
}

impl BackendNotification {
	/// Notification kind for logging.
	pub fn kind(&self) -> &'static str {
		match self {
			BackendNotification::AccountUpdated => "AccountUpdated",
			BackendNotification::GatewayBatchUpdated { .. } => "GatewayBatchUpdated",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_notification_wire_shape() {
		let parsed: BackendNotification = serde_json::from_str(
			r#"{"type": "GatewayBatchUpdated", "payload": {"hash": "0xbatch"}}"#,
		)
		.unwrap();
		assert_eq!(
			parsed,
			BackendNotification::GatewayBatchUpdated {
				hash: "0xbatch".to_string()
			}
		);

		let parsed: BackendNotification =
			serde_json::from_str(r#"{"type": "AccountUpdated"}"#).unwrap();
		assert_eq!(parsed, BackendNotification::AccountUpdated);
	}

	#[test]
	fn test_unknown_batch_state_deserializes() {
		let parsed: GatewayBatchState = serde_json::from_str("\"somethingNew\"").unwrap();
		assert_eq!(parsed, GatewayBatchState::Unknown);
	}

	#[test]
	fn test_fee_normalization_falls_back_without_token_cost() {
		let plr = TokenConfig {
			address: "0xe3818504c1b32bf1557b16c238b2e01fd3149c17"
				.parse()
				.unwrap(),
			symbol: "PLR".to_string(),
			decimals: 18,
		};

		// Token requested and priced: fee is the token cost.
		let priced = RawBatchEstimate {
			estimated_gas: U256::from(50_000u64),
			estimated_gas_price: U256::from(30u64),
			gas_token_cost: Some(U256::from(7_000u64)),
		};
		let fee_info = priced.to_fee_info(Some(plr.clone()));
		assert_eq!(fee_info.fee, U256::from(7_000u64));
		assert_eq!(fee_info.gas_token.as_ref().map(|t| t.symbol.as_str()), Some("PLR"));
		assert_eq!(fee_info.gas_price, None);

		// Token requested but the backend did not price it: native fallback
		// with no token attached.
		let unpriced = RawBatchEstimate {
			estimated_gas: U256::from(50_000u64),
			estimated_gas_price: U256::from(30u64),
			gas_token_cost: None,
		};
		let fee_info = unpriced.to_fee_info(Some(plr));
		assert_eq!(fee_info.fee, U256::from(1_500_000u64));
		assert_eq!(fee_info.gas_token, None);
	}
}
