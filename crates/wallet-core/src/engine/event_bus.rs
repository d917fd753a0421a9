//! Event bus for broadcasting engine events.

use tokio::sync::broadcast;
use wallet_types::WalletEvent;

/// Broadcast channel distributing engine events to any number of
/// subscribers.
///
/// Publishing is best-effort: a subscriber that falls behind sees a lagged
/// error on its receiver and continues from the oldest retained event, and
/// events published with no subscriber at all are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
	sender: broadcast::Sender<WalletEvent>,
}

impl EventBus {
	/// Creates a new event bus retaining up to `capacity` events per
	/// subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Subscribes to the event stream from this point on.
	pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when no subscriber exists; callers that publish
	/// best-effort drop the result.
	pub fn publish(
		&self,
		event: WalletEvent,
	) -> Result<(), broadcast::error::SendError<WalletEvent>> {
		self.sender.send(event).map(|_| ())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wallet_types::{BalancesEvent, Chain};

	#[tokio::test]
	async fn test_publish_reaches_subscriber() {
		let bus = EventBus::new(16);
		let mut rx = bus.subscribe();

		bus.publish(WalletEvent::Balances(BalancesEvent::RefreshRequested {
			account_id: "0xabc".to_string(),
			chain: Chain::Ethereum,
		}))
		.unwrap();

		assert!(matches!(
			rx.recv().await.unwrap(),
			WalletEvent::Balances(BalancesEvent::RefreshRequested { .. })
		));
	}

	#[tokio::test]
	async fn test_publish_without_subscribers_is_an_error() {
		let bus = EventBus::new(16);
		let result = bus.publish(WalletEvent::Balances(BalancesEvent::RefreshRequested {
			account_id: "0xabc".to_string(),
			chain: Chain::Ethereum,
		}));
		assert!(result.is_err());
	}
}
