//! Registry trait for pluggable implementations.
//!
//! Storage backends, signers, wallet backends, chain RPC providers and
//! bridge transports all register themselves under a name so the service
//! binary can wire them up from configuration alone.

/// Trait for registering component implementations.
///
/// Each implementation exposes its configuration name and the factory
/// function that constructs it. The concrete factory signature is defined
/// by each component crate.
pub trait ImplementationRegistry {
	/// The name of this implementation as referenced in configuration.
	const NAME: &'static str;

	/// The factory function type for this component kind.
	type Factory;

	/// Returns the factory function for creating instances.
	fn factory() -> Self::Factory;
}
