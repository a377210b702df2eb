pub mod config;
pub mod error;
mod producer;
mod retry;
pub mod sources;

pub use config::{SourceConfig, default_key_field};
pub use error::ProducerError;
pub use producer::{ProducerExit, spawn_producer};
pub use retry::RetryPolicy;
pub use sources::build_source;
