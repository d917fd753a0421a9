//! WalletConnect bridge module for the wallet transaction engine.
//!
//! This module manages dApp sessions and their inbound call requests. Bridge
//! implementations own the transport and feed session and call events into
//! the engine through a channel; the service keeps the connector registry,
//! tracks pending requests and guards the approve/reject lifecycle. Call
//! requests map into the same transfer intents the fee-estimation dispatcher
//! consumes.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use wallet_types::{
	without_0x_prefix, AssetData, CallRequest, ChainConfig, ConfigSchema, Connector,
	ImplementationRegistry, TransactionToEstimate,
};

/// Re-export implementations
pub mod implementations {
	pub mod relay;
}

/// Errors that can occur during WalletConnect operations.
///
/// Session mismatches carry specific messages because each corresponds to a
/// distinct user-facing situation; they are never folded into a generic
/// failure.
#[derive(Debug, Error)]
pub enum WalletConnectError {
	/// Error that occurs during communication with the bridge transport.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs when no pending request matches the call id.
	#[error("Request not found")]
	RequestNotFound,
	/// Error that occurs when no connector matches the request's session.
	#[error("No matching connector")]
	NoMatchingConnector,
	/// Error that occurs when the session is unknown to the transport.
	#[error("Invalid session")]
	InvalidSession,
	/// Error that occurs when a call request cannot be mapped to a transfer.
	#[error("Unsupported call request: {0}")]
	UnsupportedRequest(String),
	/// Error that occurs when starting a bridge that is already running.
	#[error("Already connected")]
	AlreadyConnected,
}

/// One event delivered by a bridge implementation.
///
/// The wire shape is `{"type": ..., "payload": {...}}`, matching the
/// backend notification stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BridgeEvent {
	/// A dApp session was established.
	SessionConnected(Connector),
	/// A dApp session ended; its pending requests are void.
	#[serde(rename_all = "camelCase")]
	SessionDisconnected { peer_id: String },
	/// A dApp issued an RPC call awaiting approval or rejection.
	CallRequestReceived(CallRequest),
}

/// Trait defining the interface for bridge implementations.
///
/// A bridge owns one WalletConnect transport. It delivers session and call
/// events through the provided channel and answers approve/reject decisions
/// addressed by (peer_id, call_id).
#[async_trait]
pub trait BridgeInterface: Send + Sync {
	/// Returns the configuration schema for this bridge implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Starts delivering bridge events through the provided channel.
	///
	/// The implementation should keep delivering events until stop is called
	/// or the receiver is dropped.
	async fn start(
		&self,
		sender: mpsc::UnboundedSender<BridgeEvent>,
	) -> Result<(), WalletConnectError>;

	/// Stops delivering bridge events and tears down the transport.
	async fn stop(&self) -> Result<(), WalletConnectError>;

	/// Approves a call request on its session.
	async fn approve_call_request(
		&self,
		peer_id: &str,
		call_id: u64,
		result: &str,
	) -> Result<(), WalletConnectError>;

	/// Rejects a call request on its session.
	async fn reject_call_request(
		&self,
		peer_id: &str,
		call_id: u64,
		reason: &str,
	) -> Result<(), WalletConnectError>;
}

/// Type alias for bridge factory functions.
///
/// This is the function signature that all bridge implementations must
/// provide to create instances of their bridge interface.
pub type BridgeFactory = fn(&toml::Value) -> Result<Box<dyn BridgeInterface>, WalletConnectError>;

/// Registry trait for bridge implementations.
pub trait BridgeRegistry: ImplementationRegistry<Factory = BridgeFactory> {}

/// Get all registered bridge implementations.
pub fn get_all_implementations() -> Vec<(&'static str, BridgeFactory)> {
	use implementations::relay;

	vec![(relay::Registry::NAME, relay::Registry::factory())]
}

/// Maps an inbound call request into a transfer intent for estimation.
///
/// Only `eth_sendTransaction` maps; the first parameter supplies `to`,
/// `data` and `value`. A `to` matching a token contract on the chain
/// resolves that token's asset data so downstream formatting knows the
/// symbol and decimals.
///
/// # Errors
///
/// Returns [`WalletConnectError::UnsupportedRequest`] when the method is not
/// mappable or the parameters lack a valid recipient.
pub fn map_call_request(
	request: &CallRequest,
	chain_config: &ChainConfig,
) -> Result<TransactionToEstimate, WalletConnectError> {
	if request.method != "eth_sendTransaction" {
		return Err(WalletConnectError::UnsupportedRequest(
			request.method.clone(),
		));
	}

	let params = request
		.params
		.first()
		.ok_or_else(|| WalletConnectError::UnsupportedRequest("missing parameters".to_string()))?;

	let to: Address = params
		.get("to")
		.and_then(|v| v.as_str())
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| WalletConnectError::UnsupportedRequest("missing recipient".to_string()))?;

	let value = match params.get("value").and_then(|v| v.as_str()) {
		Some(raw) => U256::from_str_radix(without_0x_prefix(raw), 16)
			.map_err(|e| WalletConnectError::UnsupportedRequest(format!("bad value: {}", e)))?,
		None => U256::ZERO,
	};

	let data = params
		.get("data")
		.and_then(|v| v.as_str())
		.map(String::from);

	let asset_data = chain_config.token_by_address(&to).map(|token| AssetData {
		contract_address: token.address,
		decimals: token.decimals,
		symbol: token.symbol.clone(),
		legacy: false,
	});

	Ok(TransactionToEstimate {
		to,
		data,
		value,
		asset_data,
	})
}

/// Service that manages dApp sessions and their pending call requests.
///
/// Connectors and requests live in memory only; sessions do not survive a
/// restart. Approve and reject are guarded transitions: the pending request
/// and its connector must both exist, otherwise the caller gets a named
/// error rather than a silent no-op.
pub struct WalletConnectService {
	/// Bridge implementations delivering session traffic.
	bridges: Vec<Box<dyn BridgeInterface>>,
	/// Established dApp sessions keyed by peer id.
	connectors: RwLock<Vec<Connector>>,
	/// Inbound call requests awaiting a decision.
	pending_requests: RwLock<Vec<CallRequest>>,
}

impl WalletConnectService {
	/// Creates a new WalletConnectService with the specified bridges.
	pub fn new(bridges: Vec<Box<dyn BridgeInterface>>) -> Self {
		Self {
			bridges,
			connectors: RwLock::new(Vec::new()),
			pending_requests: RwLock::new(Vec::new()),
		}
	}

	/// Starts all configured bridges, feeding events into the channel.
	pub async fn start_all(
		&self,
		sender: mpsc::UnboundedSender<BridgeEvent>,
	) -> Result<(), WalletConnectError> {
		for bridge in &self.bridges {
			bridge.start(sender.clone()).await?;
		}
		Ok(())
	}

	/// Stops all configured bridges.
	pub async fn stop_all(&self) -> Result<(), WalletConnectError> {
		for bridge in &self.bridges {
			bridge.stop().await?;
		}
		Ok(())
	}

	/// Registers an established session, replacing a previous one with the
	/// same peer id.
	pub async fn add_connector(&self, connector: Connector) {
		let mut connectors = self.connectors.write().await;
		connectors.retain(|c| c.peer_id != connector.peer_id);
		connectors.push(connector);
	}

	/// Removes a session and voids its pending requests.
	pub async fn remove_connector(&self, peer_id: &str) {
		self.connectors
			.write()
			.await
			.retain(|c| c.peer_id != peer_id);
		self.pending_requests
			.write()
			.await
			.retain(|r| r.peer_id != peer_id);
	}

	/// Tracks an inbound call request until it is approved or rejected.
	///
	/// A request with an already tracked call id is dropped; the transport
	/// may redeliver.
	pub async fn register_request(&self, request: CallRequest) {
		let mut requests = self.pending_requests.write().await;
		if requests.iter().any(|r| r.call_id == request.call_id) {
			return;
		}
		requests.push(request);
	}

	/// Returns the current session list.
	pub async fn connectors(&self) -> Vec<Connector> {
		self.connectors.read().await.clone()
	}

	/// Returns the call requests awaiting a decision.
	pub async fn pending_requests(&self) -> Vec<CallRequest> {
		self.pending_requests.read().await.clone()
	}

	/// Looks up a pending request and checks its connector still exists.
	async fn checked_request(&self, call_id: u64) -> Result<CallRequest, WalletConnectError> {
		let request = self
			.pending_requests
			.read()
			.await
			.iter()
			.find(|r| r.call_id == call_id)
			.cloned()
			.ok_or(WalletConnectError::RequestNotFound)?;

		let connected = self
			.connectors
			.read()
			.await
			.iter()
			.any(|c| c.peer_id == request.peer_id);
		if !connected {
			return Err(WalletConnectError::NoMatchingConnector);
		}

		Ok(request)
	}

	/// Sends the decision through the bridge holding the session.
	///
	/// Bridges that do not know the session answer with an invalid-session
	/// error; the first bridge that accepts wins.
	async fn dispatch_decision(
		&self,
		request: &CallRequest,
		approve: bool,
		payload: &str,
	) -> Result<(), WalletConnectError> {
		let mut last_error = WalletConnectError::InvalidSession;

		for bridge in &self.bridges {
			let result = if approve {
				bridge
					.approve_call_request(&request.peer_id, request.call_id, payload)
					.await
			} else {
				bridge
					.reject_call_request(&request.peer_id, request.call_id, payload)
					.await
			};

			match result {
				Ok(()) => return Ok(()),
				Err(e) => {
					tracing::trace!(
						peer_id = %request.peer_id,
						call_id = request.call_id,
						"Bridge declined decision: {}",
						e
					);
					last_error = e;
				}
			}
		}

		Err(last_error)
	}

	/// Approves a pending call request with the given result payload.
	///
	/// Returns the approved request so the caller can act on it.
	pub async fn approve(
		&self,
		call_id: u64,
		result: &str,
	) -> Result<CallRequest, WalletConnectError> {
		let request = self.checked_request(call_id).await?;
		self.dispatch_decision(&request, true, result).await?;

		self.pending_requests
			.write()
			.await
			.retain(|r| r.call_id != call_id);
		Ok(request)
	}

	/// Rejects a pending call request with the given reason.
	pub async fn reject(
		&self,
		call_id: u64,
		reason: &str,
	) -> Result<CallRequest, WalletConnectError> {
		let request = self.checked_request(call_id).await?;
		self.dispatch_decision(&request, false, reason).await?;

		self.pending_requests
			.write()
			.await
			.retain(|r| r.call_id != call_id);
		Ok(request)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;
	use wallet_types::{Chain, TokenConfig};

	struct StubBridge {
		approvals: Arc<AtomicUsize>,
		rejections: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl BridgeInterface for StubBridge {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not exercised in tests")
		}

		async fn start(
			&self,
			_sender: mpsc::UnboundedSender<BridgeEvent>,
		) -> Result<(), WalletConnectError> {
			Ok(())
		}

		async fn stop(&self) -> Result<(), WalletConnectError> {
			Ok(())
		}

		async fn approve_call_request(
			&self,
			_peer_id: &str,
			_call_id: u64,
			_result: &str,
		) -> Result<(), WalletConnectError> {
			self.approvals.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}

		async fn reject_call_request(
			&self,
			_peer_id: &str,
			_call_id: u64,
			_reason: &str,
		) -> Result<(), WalletConnectError> {
			self.rejections.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn service() -> (WalletConnectService, Arc<AtomicUsize>, Arc<AtomicUsize>) {
		let approvals = Arc::new(AtomicUsize::new(0));
		let rejections = Arc::new(AtomicUsize::new(0));
		let bridge = StubBridge {
			approvals: approvals.clone(),
			rejections: rejections.clone(),
		};
		(
			WalletConnectService::new(vec![Box::new(bridge)]),
			approvals,
			rejections,
		)
	}

	fn connector(peer_id: &str) -> Connector {
		Connector {
			peer_id: peer_id.to_string(),
			chain: Chain::Ethereum,
			name: "Example dApp".to_string(),
			url: "https://dapp.example.com".to_string(),
			icon: None,
		}
	}

	fn call_request(peer_id: &str, call_id: u64) -> CallRequest {
		CallRequest {
			peer_id: peer_id.to_string(),
			call_id,
			method: "eth_sendTransaction".to_string(),
			params: vec![serde_json::json!({
				"to": "0xe3818504c1B32bF1557b16C238B2E01Fd3149C17",
				"value": "0x1bc16d674ec80000",
				"data": "0x"
			})],
			name: "Example dApp".to_string(),
			url: "https://dapp.example.com".to_string(),
			icon: None,
		}
	}

	#[tokio::test]
	async fn test_approve_requires_pending_request() {
		let (service, approvals, _) = service();

		let result = service.approve(42, "0xhash").await;

		assert!(matches!(result, Err(WalletConnectError::RequestNotFound)));
		assert_eq!(approvals.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_approve_requires_live_connector() {
		let (service, approvals, _) = service();
		service.register_request(call_request("peer-1", 7)).await;

		let result = service.approve(7, "0xhash").await;

		assert!(matches!(
			result,
			Err(WalletConnectError::NoMatchingConnector)
		));
		assert_eq!(approvals.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_approve_removes_request() {
		let (service, approvals, _) = service();
		service.add_connector(connector("peer-1")).await;
		service.register_request(call_request("peer-1", 7)).await;

		let approved = service.approve(7, "0xhash").await.unwrap();

		assert_eq!(approved.call_id, 7);
		assert_eq!(approvals.load(Ordering::SeqCst), 1);
		assert!(service.pending_requests().await.is_empty());

		// The decision already went out; a second approve is a hard error.
		let again = service.approve(7, "0xhash").await;
		assert!(matches!(again, Err(WalletConnectError::RequestNotFound)));
		assert_eq!(approvals.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_disconnect_voids_pending_requests() {
		let (service, _, rejections) = service();
		service.add_connector(connector("peer-1")).await;
		service.register_request(call_request("peer-1", 7)).await;

		service.remove_connector("peer-1").await;

		assert!(service.pending_requests().await.is_empty());
		let result = service.reject(7, "declined").await;
		assert!(matches!(result, Err(WalletConnectError::RequestNotFound)));
		assert_eq!(rejections.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_duplicate_call_id_is_dropped() {
		let (service, _, _) = service();
		service.register_request(call_request("peer-1", 7)).await;
		service.register_request(call_request("peer-1", 7)).await;

		assert_eq!(service.pending_requests().await.len(), 1);
	}

	#[test]
	fn test_map_call_request_resolves_token_asset() {
		let chain_config = ChainConfig {
			chain_id: 1,
			rpc_url: "http://localhost:8545".to_string(),
			tokens: vec![TokenConfig {
				address: "0xe3818504c1b32bf1557b16c238b2e01fd3149c17"
					.parse()
					.unwrap(),
				symbol: "PLR".to_string(),
				decimals: 18,
			}],
		};

		let intent = map_call_request(&call_request("peer-1", 7), &chain_config).unwrap();

		assert_eq!(intent.value, U256::from(2_000_000_000_000_000_000u64));
		assert_eq!(intent.data.as_deref(), Some("0x"));
		assert_eq!(
			intent.asset_data.map(|a| a.symbol),
			Some("PLR".to_string())
		);
	}

	#[test]
	fn test_map_call_request_rejects_other_methods() {
		let chain_config = ChainConfig {
			chain_id: 1,
			rpc_url: "http://localhost:8545".to_string(),
			tokens: vec![],
		};
		let mut request = call_request("peer-1", 7);
		request.method = "personal_sign".to_string();

		let result = map_call_request(&request, &chain_config);

		assert!(matches!(
			result,
			Err(WalletConnectError::UnsupportedRequest(_))
		));
	}
}
