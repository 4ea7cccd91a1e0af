//! Registry trait for self-registering implementations.
//!
//! This module provides the base trait that pluggable backends implement
//! to register themselves with their configuration name and factory
//! function.

/// Base trait for implementation registries.
///
/// Each backend module (the storage backends today) provides a Registry
/// struct that implements this trait. This ensures that every
/// implementation declares its configuration name and provides a factory
/// function.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This should match the key used in the TOML configuration, for example:
	/// - "memory" for storage.implementations.memory
	/// - "file" for storage.implementations.file
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	///
	/// Returns the factory function that can create instances of this
	/// implementation when provided with the appropriate configuration.
	fn factory() -> Self::Factory;
}
