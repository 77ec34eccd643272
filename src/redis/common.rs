use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use redis::{Client, aio::ConnectionManager};

use crate::FlashStockError;

/// A round-robin pool of [`redis::aio::ConnectionManager`]s.
pub struct FlashStockRedisClient {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl FlashStockRedisClient {
    /// Create a client with a single connection manager.
    pub async fn default_from_client(client: Client) -> Result<Self, FlashStockError> {
        Self::from_client(client, 1).await
    }

    /// Create a client with `connection_count` connection managers.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, FlashStockError> {
        if connection_count == 0 {
            return Err(FlashStockError::InvalidRedisClientConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Self::from_connection_managers(connection_managers)
    }

    /// Wrap already-established connection managers.
    ///
    /// Fails with [`FlashStockError::InvalidRedisClientConnectionCount`] if
    /// `connection_managers` is empty.
    pub fn from_connection_managers(
        connection_managers: Vec<ConnectionManager>,
    ) -> Result<Self, FlashStockError> {
        if connection_managers.is_empty() {
            return Err(FlashStockError::InvalidRedisClientConnectionCount(
                "at least one connection manager is required".to_string(),
            ));
        }

        Ok(Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        })
    }

    /// Get the next [`redis::aio::ConnectionManager`] in round-robin order.
    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get
} // end impl FlashStockRedisClient

impl Clone for FlashStockRedisClient {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

impl std::fmt::Debug for FlashStockRedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashStockRedisClient")
            .field("connection_count", &self.connection_managers.len())
            .field("track_index", &self.track_index)
            .finish_non_exhaustive()
    }
}
