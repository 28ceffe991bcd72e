pub use config::ClientConfig;
pub use error::{ErrorCode, KafkaError, Result};
pub use log::{LogLevel, SyslogLevel};
pub use util::Timeout;

pub mod client;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
mod log;
pub mod message;
pub mod mock;
pub mod producer;
mod queue;
mod util;
