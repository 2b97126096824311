//! Async timeout helpers.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default per-read timeout when the config store has no usable value.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for the per-read timeout.
pub const MAX_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// How long shutdown waits for in-flight connections.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout the client applies to connect and to each reply.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `fut`, mapping an elapsed deadline to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}
