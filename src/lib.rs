//! A Tokio-based pool that runs a fixed set of long-running workers
//! concurrently, contains their failures, and supports cooperative shutdown,
//! plus the leveled logger facade it reports through.

mod config;
mod context;
mod error;
pub mod logger;
mod pool;
mod record;
mod value;
mod worker;

pub use config::{LogFormat, LogOutput, LoggerConfig};
pub use context::RequestContext;
pub use error::{PoolError, WorkerError};
pub use logger::{Logger, LoggerError, Unrecoverable};
pub use pool::{PoolState, WorkerPool};
pub use record::Attr;
pub use value::LogValue;
pub use worker::Worker;

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
