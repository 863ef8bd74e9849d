use crate::store::{BulkItem, DocumentStore, StoreError};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Documents sent in the bulk request.
    pub shipped: usize,
    /// Documents the store rejected. They are not sent again.
    pub rejected: usize,
}

/// Ordered buffer of pending documents plus the bulk writer draining it.
///
/// The buffer is only reachable through this type. It is guarded by an
/// async mutex that stays locked for the whole bulk call, so a flush
/// always ships and clears one consistent snapshot and producers wait
/// while a flush is in flight.
///
/// Delivery policy:
/// - the store acknowledged the request (even with per-item errors): the
///   buffer is cleared and rejected items are logged, not retried;
/// - the request itself failed: the buffer is kept as-is and the error is
///   returned, so the next flush re-sends the same documents.
pub struct Shipper {
    store: Arc<dyn DocumentStore>,
    index: String,
    batch_size: usize,
    buffer: Mutex<Vec<BulkItem>>,
}

impl Shipper {
    /// `batch_size` is the document count that triggers an inline flush;
    /// it is clamped to at least 1.
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>, batch_size: usize) -> Self {
        Shipper {
            store,
            index: index.into(),
            batch_size: batch_size.max(1),
            buffer: Mutex::new(Vec::with_capacity(batch_size.max(1))),
        }
    }

    /// Default index for documents enqueued without an explicit target.
    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Number of documents waiting to be shipped.
    pub async fn pending(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Number of bulk body lines the pending documents occupy (two each).
    pub async fn buffered_lines(&self) -> usize {
        self.pending().await * 2
    }

    pub async fn snapshot(&self) -> Vec<BulkItem> {
        self.buffer.lock().await.clone()
    }

    /// Append a document for `index` (or the default index).
    ///
    /// When this push brings the buffer to `batch_size` documents, the
    /// whole buffer is flushed before returning and the caller waits for
    /// it.
    ///
    /// **Returns**
    /// - `Ok(None)` if the document was only buffered.
    /// - `Ok(Some(report))` if the push triggered a flush.
    /// - `Err(..)` if the triggered flush failed at the transport level;
    ///   the document stays buffered.
    pub async fn enqueue(
        &self,
        index: Option<&str>,
        document: Value,
    ) -> Result<Option<FlushReport>, StoreError> {
        let mut buffer = self.buffer.lock().await;
        buffer.push(BulkItem::new(index.unwrap_or(&self.index), document));

        if buffer.len() >= self.batch_size {
            return self.ship(&mut buffer).await.map(Some);
        }
        Ok(None)
    }

    /// Ship the entire buffer in one bulk request. No-op when empty.
    pub async fn flush(&self) -> Result<FlushReport, StoreError> {
        let mut buffer = self.buffer.lock().await;
        self.ship(&mut buffer).await
    }

    async fn ship(&self, buffer: &mut Vec<BulkItem>) -> Result<FlushReport, StoreError> {
        if buffer.is_empty() {
            return Ok(FlushReport::default());
        }

        let response = self.store.bulk(buffer).await?;

        let failed: Vec<_> = response.failed_items().collect();
        let report = FlushReport {
            shipped: buffer.len(),
            rejected: failed.len(),
        };

        if response.errors {
            error!(
                shipped = report.shipped,
                rejected = report.rejected,
                items = ?failed,
                "bulk indexing errors, rejected documents are dropped"
            );
        } else {
            debug!(shipped = report.shipped, "flushed log entries");
        }

        buffer.clear();
        Ok(report)
    }
}
