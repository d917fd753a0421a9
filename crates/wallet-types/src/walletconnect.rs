//! WalletConnect session and call-request types.
//!
//! Sessions are ephemeral and never persisted. A [`Connector`] is the
//! addressable dApp session keyed by `peer_id`; a [`CallRequest`] is one
//! inbound RPC call from that dApp awaiting approval or rejection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chains::Chain;

/// An established dApp session.
///
/// Sessions are chain-scoped: every call request arriving on the session
/// is executed against `chain`.
///
/// # Fields
///
/// * `peer_id` - Unique session identifier, the addressable target for
///   approve/reject
/// * `chain` - Chain the session was established for
/// * `name` / `url` / `icon` - dApp metadata shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
	pub peer_id: String,
	pub chain: Chain,
	pub name: String,
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub icon: Option<String>,
}

/// One inbound dApp RPC call awaiting a decision.
///
/// # Fields
///
/// * `peer_id` - Session the call arrived on
/// * `call_id` - Identifier used to approve or reject the exact call
/// * `method` - RPC method name, e.g. `eth_sendTransaction`
/// * `params` - Raw JSON parameters as supplied by the dApp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
	pub peer_id: String,
	pub call_id: u64,
	pub method: String,
	#[serde(default)]
	pub params: Vec<Value>,
	pub name: String,
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub icon: Option<String>,
}
