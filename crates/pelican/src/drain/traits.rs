//! Seams for the drain loop: where records come from and where batches go.

use async_trait::async_trait;

use squall_common::error::{IndexError, TransportError};
use squall_common::index::BulkAction;
use squall_common::{IndexClient, QueueConnection};

/// Source of raw queue entries.
#[async_trait]
pub trait QueueSource: Send {
    /// Pop one raw entry, `None` when the queue is empty.
    async fn pop(&mut self) -> Result<Option<String>, TransportError>;
}

#[async_trait]
impl QueueSource for QueueConnection {
    async fn pop(&mut self) -> Result<Option<String>, TransportError> {
        QueueConnection::pop(self).await
    }
}

/// Destination for bulk action batches.
#[async_trait]
pub trait BulkSink: Send + Sync {
    /// Submit the batch, returning the number of actions flushed.
    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<usize, IndexError>;
}

#[async_trait]
impl BulkSink for IndexClient {
    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<usize, IndexError> {
        IndexClient::bulk(self, actions).await
    }
}
