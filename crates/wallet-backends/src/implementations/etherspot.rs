//! Etherspot gateway backend implementation.
//!
//! This implementation talks to the Etherspot backend over HTTP. Batches are
//! mirrored locally per (account, chain) and shipped wholesale when an
//! estimate is requested, so the estimate always prices exactly the
//! transactions appended since the last clear. Notifications are polled from
//! the gateway with a cursor and fanned into the engine's channel.

use crate::{BackendError, BackendFactory, BackendRegistry, WalletBackendInterface};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use wallet_types::{
	Account, AccountExtra, BackendNotification, Chain, ChainTransaction, ConfigSchema, Field,
	FieldType, ImplementationRegistry, RawBatchEstimate, Schema, SubmittedBatch, TokenConfig,
	ValidationError,
};

/// Header carrying the gateway API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Request body for a batch estimate.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateRequest<'a> {
	transactions: &'a [ChainTransaction],
	#[serde(skip_serializing_if = "Option::is_none")]
	gas_token: Option<Address>,
}

/// One account entry in the gateway's account listing.
#[derive(Debug, Deserialize)]
struct AccountPayload {
	address: String,
}

/// One notification as delivered by the gateway poll endpoint.
#[derive(Debug, Deserialize)]
struct NotificationEnvelope {
	chain: Chain,
	#[serde(flatten)]
	notification: BackendNotification,
}

/// A page of notifications with the cursor to poll from next.
#[derive(Debug, Deserialize)]
struct NotificationsResponse {
	items: Vec<NotificationEnvelope>,
	cursor: u64,
}

/// Etherspot backend implementation.
///
/// Supports all configured chains with a single instance; the gateway keys
/// batch and account state by (address, chain).
pub struct EtherspotBackend {
	/// HTTP client used for all gateway calls.
	client: reqwest::Client,
	/// Base URL of the gateway, without a trailing slash.
	endpoint: String,
	/// API key sent with every request, when configured.
	api_key: Option<String>,
	/// Local mirror of the pending batch per (account, chain).
	batches: Mutex<HashMap<(String, Chain), Vec<ChainTransaction>>>,
	/// Cursor of the last notification page consumed.
	last_cursor: Arc<Mutex<u64>>,
	/// Flag indicating if notification polling is active.
	is_polling: Arc<AtomicBool>,
	/// Channel for signaling polling shutdown.
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
	/// Polling interval for the notification loop in seconds.
	polling_interval_secs: u64,
}

impl EtherspotBackend {
	/// Creates a new Etherspot backend for the given gateway endpoint.
	pub fn new(endpoint: &str, api_key: Option<String>, polling_interval_secs: Option<u64>) -> Self {
		Self {
			client: reqwest::Client::new(),
			endpoint: endpoint.trim_end_matches('/').to_string(),
			api_key,
			batches: Mutex::new(HashMap::new()),
			last_cursor: Arc::new(Mutex::new(0)),
			is_polling: Arc::new(AtomicBool::new(false)),
			stop_signal: Arc::new(Mutex::new(None)),
			polling_interval_secs: polling_interval_secs.unwrap_or(5),
		}
	}

	/// Builds a request with the API key attached when one is configured.
	fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
		let mut builder = self.client.request(method, url);
		if let Some(key) = &self.api_key {
			builder = builder.header(API_KEY_HEADER, key);
		}
		builder
	}

	/// Sends the request and surfaces non-success statuses as errors.
	async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
		let response = builder
			.send()
			.await
			.map_err(|e| BackendError::Network(format!("Gateway request failed: {}", e)))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(BackendError::Network(format!(
				"Gateway returned {}: {}",
				status, body
			)));
		}

		Ok(response)
	}

	/// Polls the gateway for notifications and sends them through the
	/// provided channel until stopped or the receiver is dropped.
	async fn notification_loop(
		client: reqwest::Client,
		endpoint: String,
		api_key: Option<String>,
		last_cursor: Arc<Mutex<u64>>,
		sender: mpsc::UnboundedSender<(Chain, BackendNotification)>,
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
					let url = format!("{}/notifications?cursor={}", endpoint, *cursor);

					let mut request = client.get(&url);
					if let Some(key) = &api_key {
						request = request.header(API_KEY_HEADER, key);
					}

					let response = match request.send().await {
						Ok(response) => response,
						Err(e) => {
							tracing::error!("Failed to poll notifications: {}", e);
							continue;
						}
					};

					let page: NotificationsResponse = match response.json().await {
						Ok(page) => page,
						Err(e) => {
							tracing::error!("Failed to decode notifications: {}", e);
							continue;
						}
					};

					*cursor = page.cursor;

					for envelope in page.items {
						if sender.send((envelope.chain, envelope.notification)).is_err() {
							// Receiver dropped; polling has no consumer left.
							return;
						}
					}
				}
				_ = stop_rx.recv() => {
					tracing::debug!("Stopping notification polling");
					break;
				}
			}
		}
	}
}

/// Configuration schema for the Etherspot backend.
pub struct EtherspotBackendSchema;

impl EtherspotBackendSchema {
	/// Static validation method for use before instance creation
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		let instance = Self;
		instance.validate(config)
	}
}

impl ConfigSchema for EtherspotBackendSchema {
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
			vec![
				Field::new("api_key", FieldType::String),
				Field::new(
					"polling_interval_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(3600),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl WalletBackendInterface for EtherspotBackend {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EtherspotBackendSchema)
	}

	async fn clear_batch(&self, account: &Account, chain: Chain) -> Result<(), BackendError> {
		// Drop the gateway-side batch first; a stale one must not survive
		// into the next estimate.
		let url = format!(
			"{}/accounts/{}/batches/{}",
			self.endpoint, account.address, chain
		);
		self.send(self.request(reqwest::Method::DELETE, url)).await?;

		let mut batches = self.batches.lock().await;
		batches.remove(&(account.id.clone(), chain));
		Ok(())
	}

	async fn append_to_batch(
		&self,
		account: &Account,
		chain: Chain,
		transaction: &ChainTransaction,
	) -> Result<(), BackendError> {
		let mut batches = self.batches.lock().await;
		batches
			.entry((account.id.clone(), chain))
			.or_default()
			.push(transaction.clone());
		Ok(())
	}

	async fn estimate_batch(
		&self,
		account: &Account,
		chain: Chain,
		gas_token: Option<&TokenConfig>,
	) -> Result<RawBatchEstimate, BackendError> {
		let transactions = {
			let batches = self.batches.lock().await;
			batches
				.get(&(account.id.clone(), chain))
				.cloned()
				.unwrap_or_default()
		};

		let url = format!(
			"{}/accounts/{}/batches/{}/estimate",
			self.endpoint, account.address, chain
		);
		let body = EstimateRequest {
			transactions: &transactions,
			gas_token: gas_token.map(|t| t.address),
		};

		let response = self
			.send(self.request(reqwest::Method::POST, url).json(&body))
			.await?;

		response
			.json::<RawBatchEstimate>()
			.await
			.map_err(|e| BackendError::Network(format!("Failed to decode estimate: {}", e)))
	}

	async fn estimate_transactions(
		&self,
		account: &Account,
		chain: Chain,
		transactions: &[ChainTransaction],
		gas_token: Option<&TokenConfig>,
	) -> Result<RawBatchEstimate, BackendError> {
		self.clear_batch(account, chain).await?;
		for transaction in transactions {
			self.append_to_batch(account, chain, transaction).await?;
		}
		self.estimate_batch(account, chain, gas_token).await
	}

	async fn submitted_batch(
		&self,
		chain: Chain,
		batch_hash: &str,
	) -> Result<SubmittedBatch, BackendError> {
		let url = format!(
			"{}/batches/{}?chain={}",
			self.endpoint, batch_hash, chain
		);

		let response = self
			.request(reqwest::Method::GET, url)
			.send()
			.await
			.map_err(|e| BackendError::Network(format!("Gateway request failed: {}", e)))?;

		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Err(BackendError::BatchNotFound(batch_hash.to_string()));
		}
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(BackendError::Network(format!(
				"Gateway returned {}: {}",
				status, body
			)));
		}

		response
			.json::<SubmittedBatch>()
			.await
			.map_err(|e| BackendError::Network(format!("Failed to decode batch: {}", e)))
	}

	async fn fetch_accounts(&self) -> Result<Vec<String>, BackendError> {
		let url = format!("{}/accounts", self.endpoint);
		let response = self.send(self.request(reqwest::Method::GET, url)).await?;

		let accounts: Vec<AccountPayload> = response
			.json()
			.await
			.map_err(|e| BackendError::Network(format!("Failed to decode accounts: {}", e)))?;

		Ok(accounts.into_iter().map(|a| a.address).collect())
	}

	async fn fetch_account_chains(
		&self,
		account: &Account,
	) -> Result<HashMap<Chain, AccountExtra>, BackendError> {
		let url = format!("{}/accounts/{}/chains", self.endpoint, account.address);
		let response = self.send(self.request(reqwest::Method::GET, url)).await?;

		let by_name: HashMap<String, AccountExtra> = response
			.json()
			.await
			.map_err(|e| BackendError::Network(format!("Failed to decode account chains: {}", e)))?;

		// Chains the gateway knows but this build does not are skipped.
		Ok(by_name
			.into_iter()
			.filter_map(|(name, extra)| name.parse::<Chain>().ok().map(|chain| (chain, extra)))
			.collect())
	}

	async fn start_notifications(
		&self,
		sender: mpsc::UnboundedSender<(Chain, BackendNotification)>,
	) -> Result<(), BackendError> {
		if self.is_polling.load(Ordering::SeqCst) {
			return Err(BackendError::AlreadySubscribed);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		// Spawn polling task
		let client = self.client.clone();
		let endpoint = self.endpoint.clone();
		let api_key = self.api_key.clone();
		let last_cursor = self.last_cursor.clone();
		let polling_interval_secs = self.polling_interval_secs;

		tokio::spawn(async move {
			Self::notification_loop(
				client,
				endpoint,
				api_key,
				last_cursor,
				sender,
				stop_rx,
				polling_interval_secs,
			)
			.await;
		});

		self.is_polling.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn stop_notifications(&self) -> Result<(), BackendError> {
		if !self.is_polling.load(Ordering::SeqCst) {
			return Ok(());
		}

		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}

		self.is_polling.store(false, Ordering::SeqCst);
		Ok(())
	}
}

/// Factory function to create an Etherspot backend from configuration.
///
/// Required configuration parameters:
/// - `endpoint`: The gateway HTTP(S) base URL
///
/// Optional configuration parameters:
/// - `api_key`: API key sent with every request
/// - `polling_interval_secs`: Notification polling interval (defaults to 5)
pub fn create_backend(config: &toml::Value) -> Result<Box<dyn WalletBackendInterface>, BackendError> {
	// Validate configuration first
	EtherspotBackendSchema::validate_config(config)
		.map_err(|e| BackendError::Network(format!("Invalid configuration: {}", e)))?;

	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.ok_or_else(|| BackendError::Network("endpoint is required".to_string()))?;

	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.map(String::from);

	let polling_interval_secs = config
		.get("polling_interval_secs")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64);

	Ok(Box::new(EtherspotBackend::new(
		endpoint,
		api_key,
		polling_interval_secs,
	)))
}

/// Registry for the Etherspot backend implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "etherspot";
	type Factory = BackendFactory;

	fn factory() -> Self::Factory {
		create_backend
	}
}

impl BackendRegistry for Registry {}
