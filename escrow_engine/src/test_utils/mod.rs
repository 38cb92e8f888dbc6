//! Helpers for testing the engine and the crates built on it. Only compiled with the `test_utils` feature.
pub mod fixtures;
pub mod mock_processor;
pub mod prepare_env;
pub mod system;
