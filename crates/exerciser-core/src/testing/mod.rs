//! In-process stand-ins for the pool, for deterministic tests.

pub mod log_builder;
pub mod mock_pool;

pub use log_builder::UserLogBuilder;
pub use mock_pool::{MockDirectory, MockGateway, SubmissionRecord};
