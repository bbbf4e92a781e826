//! Helpers for tests of the engine and of the crates that use it.
pub mod mocks;
#[cfg(feature = "sqlite")]
pub mod prepare_env;
