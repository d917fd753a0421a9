//! HTTP relay bridge implementation.
//!
//! This implementation talks to a WalletConnect relay over HTTP. Session and
//! call events are polled from the relay with a cursor; approve and reject
//! decisions post back to the session's call resource.

use crate::{BridgeEvent, BridgeFactory, BridgeInterface, BridgeRegistry, WalletConnectError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use wallet_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};

/// A page of bridge events with the cursor to poll from next.
#[derive(Debug, Deserialize)]
struct EventsResponse {
	items: Vec<BridgeEvent>,
	cursor: u64,
}

/// Decision payload posted back to the relay.
#[derive(Debug, Serialize)]
struct DecisionRequest<'a> {
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	reason: Option<&'a str>,
}

/// HTTP relay bridge implementation.
pub struct RelayBridge {
	/// HTTP client used for all relay calls.
	client: reqwest::Client,
	/// Base URL of the relay, without a trailing slash.
	endpoint: String,
	/// Cursor of the last event page consumed.
	last_cursor: Arc<Mutex<u64>>,
	/// Flag indicating if event polling is active.
	is_running: Arc<AtomicBool>,
	/// Channel for signaling polling shutdown.
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
	/// Polling interval for the event loop in seconds.
	polling_interval_secs: u64,
}

impl RelayBridge {
	/// Creates a new relay bridge for the given endpoint.
	pub fn new(endpoint: &str, polling_interval_secs: Option<u64>) -> Self {
		Self {
			client: reqwest::Client::new(),
			endpoint: endpoint.trim_end_matches('/').to_string(),
			last_cursor: Arc::new(Mutex::new(0)),
			is_running: Arc::new(AtomicBool::new(false)),
			stop_signal: Arc::new(Mutex::new(None)),
			polling_interval_secs: polling_interval_secs.unwrap_or(3),
		}
	}

	/// Posts a decision to the relay and maps relay rejections to session
	/// errors.
	async fn post_decision(
		&self,
		peer_id: &str,
		call_id: u64,
		action: &str,
		body: DecisionRequest<'_>,
	) -> Result<(), WalletConnectError> {
		let url = format!(
			"{}/sessions/{}/calls/{}/{}",
			self.endpoint, peer_id, call_id, action
		);

		let response = self
			.client
			.post(&url)
			.json(&body)
			.send()
			.await
			.map_err(|e| WalletConnectError::Connection(format!("Relay request failed: {}", e)))?;

		match response.status() {
			status if status.is_success() => Ok(()),
			reqwest::StatusCode::NOT_FOUND => Err(WalletConnectError::InvalidSession),
			status => {
				let body = response.text().await.unwrap_or_default();
				Err(WalletConnectError::Connection(format!(
					"Relay returned {}: {}",
					status, body
				)))
			}
		}
	}

	/// Polls the relay for events and sends them through the provided
	/// channel until stopped or the receiver is dropped.
	async fn event_loop(
		client: reqwest::Client,
		endpoint: String,
		last_cursor: Arc<Mutex<u64>>,
		sender: mpsc::UnboundedSender<BridgeEvent>,
		mut stop_rx: mpsc::Receiver<()>,
		polling_interval_secs: u64,
	) {
		let mut interval =
			tokio::time::interval(std::time::Duration::from_secs(polling_interval_secs));

		// Set the interval to skip missed ticks instead of bursting
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
		// Skip the first immediate tick to avoid immediate polling
		interval.tick().await;

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let mut cursor = last_cursor.lock().await;
					let url = format!("{}/events?cursor={}", endpoint, *cursor);

					let response = match client.get(&url).send().await {
						Ok(response) => response,
						Err(e) => {
							tracing::error!("Failed to poll relay events: {}", e);
							continue;
						}
					};

					let page: EventsResponse = match response.json().await {
						Ok(page) => page,
						Err(e) => {
							tracing::error!("Failed to decode relay events: {}", e);
							continue;
						}
					};

					*cursor = page.cursor;

					for event in page.items {
						if sender.send(event).is_err() {
							// Receiver dropped; polling has no consumer left.
							return;
						}
					}
				}
				_ = stop_rx.recv() => {
					tracing::debug!("Stopping relay event polling");
					break;
				}
			}
		}
	}
}

/// Configuration schema for the relay bridge.
pub struct RelayBridgeSchema;

impl RelayBridgeSchema {
	/// Static validation method for use before instance creation
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		let instance = Self;
		instance.validate(config)
	}
}

impl ConfigSchema for RelayBridgeSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new("endpoint", FieldType::String).with_validator(|value| {
					let url = value.as_str().unwrap_or("");
					if url.starts_with("http://") || url.starts_with("https://") {
						Ok(())
					} else {
						Err("endpoint must be an HTTP(S) URL".to_string())
					}
				}),
			],
			// Optional fields
			vec![Field::new(
				"polling_interval_secs",
				FieldType::Integer {
					min: Some(1),
					max: Some(3600),
				},
			)],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl BridgeInterface for RelayBridge {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RelayBridgeSchema)
	}

	async fn start(
		&self,
		sender: mpsc::UnboundedSender<BridgeEvent>,
	) -> Result<(), WalletConnectError> {
		if self.is_running.load(Ordering::SeqCst) {
			return Err(WalletConnectError::AlreadyConnected);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		// Spawn polling task
		let client = self.client.clone();
		let endpoint = self.endpoint.clone();
		let last_cursor = self.last_cursor.clone();
		let polling_interval_secs = self.polling_interval_secs;

		tokio::spawn(async move {
			Self::event_loop(
				client,
				endpoint,
				last_cursor,
				sender,
				stop_rx,
				polling_interval_secs,
			)
			.await;
		});

		self.is_running.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn stop(&self) -> Result<(), WalletConnectError> {
		if !self.is_running.load(Ordering::SeqCst) {
			return Ok(());
		}

		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}

		self.is_running.store(false, Ordering::SeqCst);
		Ok(())
	}

	async fn approve_call_request(
		&self,
		peer_id: &str,
		call_id: u64,
		result: &str,
	) -> Result<(), WalletConnectError> {
		self.post_decision(
			peer_id,
			call_id,
			"approve",
			DecisionRequest {
				result: Some(result),
				reason: None,
			},
		)
		.await
	}

	async fn reject_call_request(
		&self,
		peer_id: &str,
		call_id: u64,
		reason: &str,
	) -> Result<(), WalletConnectError> {
		self.post_decision(
			peer_id,
			call_id,
			"reject",
			DecisionRequest {
				result: None,
				reason: Some(reason),
			},
		)
		.await
	}
}

/// Factory function to create a relay bridge from configuration.
///
/// Required configuration parameters:
/// - `endpoint`: The relay HTTP(S) base URL
///
/// Optional configuration parameters:
/// - `polling_interval_secs`: Event polling interval (defaults to 3)
pub fn create_bridge(config: &toml::Value) -> Result<Box<dyn BridgeInterface>, WalletConnectError> {
	// Validate configuration first
	RelayBridgeSchema::validate_config(config)
		.map_err(|e| WalletConnectError::Connection(format!("Invalid configuration: {}", e)))?;

	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.ok_or_else(|| WalletConnectError::Connection("endpoint is required".to_string()))?;

	let polling_interval_secs = config
		.get("polling_interval_secs")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64);

	Ok(Box::new(RelayBridge::new(endpoint, polling_interval_secs)))
}

/// Registry for the relay bridge implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "relay";
	type Factory = BridgeFactory;

	fn factory() -> Self::Factory {
		create_bridge
	}
}

impl BridgeRegistry for Registry {}
