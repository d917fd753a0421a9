//! Local signer implementation backed by a configured private key.
//!
//! This implementation derives the key-based account address from a private
//! key supplied through configuration. The key material is wrapped in
//! [`SecretString`] while it is being parsed so it never reaches logs or
//! Debug output.

use crate::{AccountError, SignerFactory, SignerInterface, SignerRegistry};
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use wallet_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, ValidationError,
};

/// A signer backed by a locally configured private key.
pub struct LocalSigner {
	/// Parsed signing key; only its derived address is ever handed out.
	signer: PrivateKeySigner,
}

impl LocalSigner {
	/// Creates a new signer from a hex-encoded private key.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer = private_key
			.with_exposed(|key| key.parse::<PrivateKeySigner>())
			.map_err(|e| AccountError::InvalidKey(format!("Failed to parse private key: {}", e)))?;
		Ok(Self { signer })
	}
}

/// Configuration schema for the local signer.
pub struct LocalSignerSchema;

impl LocalSignerSchema {
	/// Static validation method for use before instantiation
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		let instance = Self;
		instance.validate(config)
	}
}

impl ConfigSchema for LocalSignerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or("");
					let hex = key.strip_prefix("0x").unwrap_or(key);
					if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
						Ok(())
					} else {
						Err("Private key must be a 32-byte hex string".to_string())
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
impl SignerInterface for LocalSigner {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalSignerSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}
}

/// Factory function to create a local signer from configuration.
///
/// The configuration is validated against [`LocalSignerSchema`] before the
/// key is touched, so malformed configs fail with field names instead of
/// parse errors.
pub fn create_signer(config: &toml::Value) -> Result<Box<dyn SignerInterface>, AccountError> {
	// Validate configuration first
	LocalSignerSchema::validate_config(config)
		.map_err(|e| AccountError::InvalidKey(format!("Invalid configuration: {}", e)))?;

	let raw_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;
	let private_key = SecretString::from(raw_key);

	Ok(Box::new(LocalSigner::new(&private_key)?))
}

/// Registry for the local signer implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = SignerFactory;

	fn factory() -> Self::Factory {
		create_signer
	}
}

impl SignerRegistry for Registry {}
