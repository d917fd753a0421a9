//! Lifecycle management for the wallet engine.
//!
//! Handles initialization and shutdown procedures for the wallet engine,
//! ensuring the gas table is primed before the first estimation and that
//! bridges and notification streams stop cleanly.

use super::{EngineError, WalletEngine};

impl WalletEngine {
	/// Performs any initialization required before running.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(wallet = %self.config.wallet.name, "Initializing wallet engine");

		self.gas.refresh_all().await;

		Ok(())
	}

	/// Performs cleanup operations.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down wallet engine");

		if let Some(walletconnect) = &self.walletconnect {
			walletconnect.stop_all().await.map_err(|e| {
				EngineError::Service(format!("Failed to stop WalletConnect bridges: {}", e))
			})?;
		}

		self.backends.unsubscribe().await.map_err(|e| {
			EngineError::Service(format!("Failed to stop backend notifications: {}", e))
		})?;

		Ok(())
	}
}
