//! Archanova backend implementation.
//!
//! Archanova is the legacy smart-wallet service. It has no gateway batch:
//! estimates go straight to the account estimation endpoint, and submissions
//! are always priced in the native asset. Accounts imported from Archanova
//! keep working for estimation and sync, but the notification stream and
//! batch operations are Etherspot-only.

use crate::{BackendError, BackendFactory, BackendRegistry, WalletBackendInterface};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use wallet_types::{
	Account, AccountExtra, BackendNotification, Chain, ChainTransaction, ConfigSchema, Field,
	FieldType, ImplementationRegistry, RawBatchEstimate, Schema, SubmittedBatch, TokenConfig,
	ValidationError,
};

/// Request body for a direct account estimate.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateRequest<'a> {
	chain: Chain,
	transactions: &'a [ChainTransaction],
}

/// Archanova backend implementation.
pub struct ArchanovaBackend {
	/// HTTP client used for all service calls.
	client: reqwest::Client,
	/// Base URL of the service, without a trailing slash.
	endpoint: String,
}

impl ArchanovaBackend {
	/// Creates a new Archanova backend for the given service endpoint.
	pub fn new(endpoint: &str) -> Self {
		Self {
			client: reqwest::Client::new(),
			endpoint: endpoint.trim_end_matches('/').to_string(),
		}
	}

	/// Sends the request and surfaces non-success statuses as errors.
	async fn send(
		&self,
		builder: reqwest::RequestBuilder,
	) -> Result<reqwest::Response, BackendError> {
		let response = builder
			.send()
			.await
			.map_err(|e| BackendError::Network(format!("Service request failed: {}", e)))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(BackendError::Network(format!(
				"Service returned {}: {}",
				status, body
			)));
		}

		Ok(response)
	}
}

/// Configuration schema for the Archanova backend.
pub struct ArchanovaBackendSchema;

impl ArchanovaBackendSchema {
	/// Static validation method for use before instance creation
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		let instance = Self;
		instance.validate(config)
	}
}

impl ConfigSchema for ArchanovaBackendSchema {
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
			vec![],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl WalletBackendInterface for ArchanovaBackend {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ArchanovaBackendSchema)
	}

	async fn clear_batch(&self, _account: &Account, _chain: Chain) -> Result<(), BackendError> {
		Err(BackendError::Unsupported(
			"archanova does not batch transactions",
		))
	}

	async fn append_to_batch(
		&self,
		_account: &Account,
		_chain: Chain,
		_transaction: &ChainTransaction,
	) -> Result<(), BackendError> {
		Err(BackendError::Unsupported(
			"archanova does not batch transactions",
		))
	}

	async fn estimate_batch(
		&self,
		_account: &Account,
		_chain: Chain,
		_gas_token: Option<&TokenConfig>,
	) -> Result<RawBatchEstimate, BackendError> {
		Err(BackendError::Unsupported(
			"archanova does not batch transactions",
		))
	}

	async fn estimate_transactions(
		&self,
		account: &Account,
		chain: Chain,
		transactions: &[ChainTransaction],
		gas_token: Option<&TokenConfig>,
	) -> Result<RawBatchEstimate, BackendError> {
		if gas_token.is_some() {
			// Archanova prices in the native asset only; the caller falls
			// back silently when no token cost comes back.
			tracing::debug!(
				account_id = %account.id,
				"Gas token requested on archanova, estimating in native asset"
			);
		}

		let url = format!(
			"{}/accounts/{}/transactions/estimate",
			self.endpoint, account.address
		);
		let body = EstimateRequest {
			chain,
			transactions,
		};

		let response = self.send(self.client.post(&url).json(&body)).await?;

		response
			.json::<RawBatchEstimate>()
			.await
			.map_err(|e| BackendError::Network(format!("Failed to decode estimate: {}", e)))
	}

	async fn submitted_batch(
		&self,
		_chain: Chain,
		_batch_hash: &str,
	) -> Result<SubmittedBatch, BackendError> {
		Err(BackendError::Unsupported(
			"archanova does not track gateway batches",
		))
	}

	async fn fetch_accounts(&self) -> Result<Vec<String>, BackendError> {
		#[derive(serde::Deserialize)]
		struct AccountPayload {
			address: String,
		}

		let url = format!("{}/accounts", self.endpoint);
		let response = self.send(self.client.get(&url)).await?;

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
		let response = self.send(self.client.get(&url)).await?;

		let by_name: HashMap<String, AccountExtra> = response
			.json()
			.await
			.map_err(|e| BackendError::Network(format!("Failed to decode account chains: {}", e)))?;

		Ok(by_name
			.into_iter()
			.filter_map(|(name, extra)| name.parse::<Chain>().ok().map(|chain| (chain, extra)))
			.collect())
	}

	async fn start_notifications(
		&self,
		_sender: mpsc::UnboundedSender<(Chain, BackendNotification)>,
	) -> Result<(), BackendError> {
		Err(BackendError::Unsupported(
			"archanova does not stream notifications",
		))
	}

	async fn stop_notifications(&self) -> Result<(), BackendError> {
		Ok(())
	}
}

/// Factory function to create an Archanova backend from configuration.
///
/// Required configuration parameters:
/// - `endpoint`: The service HTTP(S) base URL
pub fn create_backend(
	config: &toml::Value,
) -> Result<Box<dyn WalletBackendInterface>, BackendError> {
	// Validate configuration first
	ArchanovaBackendSchema::validate_config(config)
		.map_err(|e| BackendError::Network(format!("Invalid configuration: {}", e)))?;

	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.ok_or_else(|| BackendError::Network("endpoint is required".to_string()))?;

	Ok(Box::new(ArchanovaBackend::new(endpoint)))
}

/// Registry for the Archanova backend implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "archanova";
	type Factory = BackendFactory;

	fn factory() -> Self::Factory {
		create_backend
	}
}

impl BackendRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, U256};

	#[test]
	fn test_estimate_request_wire_shape() {
		let transactions = vec![ChainTransaction {
			to: address!("e3818504c1B32bF1557b16C238B2E01Fd3149C17"),
			data: "0xa9059cbb".to_string(),
			value: U256::ZERO,
		}];

		let body = serde_json::to_value(EstimateRequest {
			chain: Chain::Xdai,
			transactions: &transactions,
		})
		.unwrap();

		assert_eq!(body["chain"], "xdai");
		assert_eq!(body["transactions"][0]["data"], "0xa9059cbb");
	}

	#[tokio::test]
	async fn test_batch_operations_are_unsupported() {
		let backend = ArchanovaBackend::new("https://archanova.example.com/");
		assert_eq!(backend.endpoint, "https://archanova.example.com");

		let account = Account::new("0xabc", wallet_types::AccountKind::ArchanovaSmartWallet);
		let result = backend.clear_batch(&account, Chain::Ethereum).await;
		assert!(matches!(result, Err(BackendError::Unsupported(_))));
	}
}
