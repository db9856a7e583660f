use redis::aio::ConnectionManager;

use crate::error::Result;

/// Opens a `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable; every clone shares the same
/// multiplexed connection, so storage and session stores each hold one.
pub async fn connect(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    tracing::debug!(url, "connected to redis");
    Ok(manager)
}
