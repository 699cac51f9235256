//! Serialized cache writes
//!
//! All store mutations, whether from handlers or the refresher, flow
//! through one multi-producer single-consumer queue. The consumer applies intents strictly in enqueue
//! order, which makes concurrent handler+refresher writes on the same key
//! deterministic (last enqueued wins) without any locking between producers,
//! against a store that offers per-key atomic writes but no multi-key
//! transactions.
//!
//! Enqueueing never blocks and never fails a request: the queue is
//! unbounded, and a write that cannot be applied is logged by the consumer
//! and dropped. The client response for an upsert may therefore be sent
//! before the entry lands in the store; persistence catches up.

use crate::entry::CacheEntry;
use crate::store::CacheStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A pending cache mutation
#[derive(Debug, Clone)]
pub enum WriteIntent {
    /// Write the entry in full under its cache key
    Upsert(CacheEntry),
    /// Remove the key
    Delete(String),
}

/// Producer handle for the write queue
///
/// Cheap to clone; one clone per handler task and one for the refresher.
#[derive(Clone)]
pub struct CacheWriter {
    tx: mpsc::UnboundedSender<WriteIntent>,
}

impl CacheWriter {
    /// Enqueue a full-entry write
    pub fn upsert(&self, entry: CacheEntry) {
        self.send(WriteIntent::Upsert(entry));
    }

    /// Enqueue a key removal
    pub fn delete(&self, key: impl Into<String>) {
        self.send(WriteIntent::Delete(key.into()));
    }

    fn send(&self, intent: WriteIntent) {
        // Only fails when the consumer is gone, i.e. during shutdown
        if self.tx.send(intent).is_err() {
            warn!("cache write dropped: writer task has stopped");
        }
    }
}

/// Start the single consumer task for `store`.
///
/// Returns the producer handle and the consumer's join handle. The consumer
/// runs until every producer handle has been dropped and the queue has
/// drained.
pub fn spawn(store: Arc<dyn CacheStore>) -> (CacheWriter, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(consume(store, rx));
    (CacheWriter { tx }, handle)
}

async fn consume(store: Arc<dyn CacheStore>, mut rx: mpsc::UnboundedReceiver<WriteIntent>) {
    while let Some(intent) = rx.recv().await {
        match intent {
            WriteIntent::Upsert(entry) => {
                if let Err(e) = store.put(&entry).await {
                    warn!(cache_key = %entry.cache_key, error = %e, "cache upsert failed");
                } else {
                    debug!(cache_key = %entry.cache_key, "cache entry written");
                }
            }
            WriteIntent::Delete(key) => {
                if let Err(e) = store.delete(&key).await {
                    warn!(cache_key = %key, error = %e, "cache delete failed");
                } else {
                    debug!(cache_key = %key, "cache entry deleted");
                }
            }
        }
    }
    debug!("cache writer stopped: queue closed");
}
