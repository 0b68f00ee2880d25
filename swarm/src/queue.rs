use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::plan::Chunk;

/// The shared FIFO of not-yet-started chunks. Ownership of a chunk is
/// tracked purely by removal from this queue: once `pop` returns a chunk, no
/// other worker will see it again unless it is explicitly re-queued (spec
/// section 4.3, "shared FIFO queue").
pub struct WorkQueue {
    inner: Mutex<VecDeque<Chunk>>,
}

impl WorkQueue {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            inner: Mutex::new(chunks.into()),
        }
    }

    pub async fn pop(&self) -> Option<Chunk> {
        self.inner.lock().await.pop_front()
    }

    /// Re-queues a chunk at the back (ordinary failure retry).
    pub async fn push_back(&self, chunk: Chunk) {
        self.inner.lock().await.push_back(chunk);
    }

    /// Re-queues a chunk at the front (slow-peer cycling: the chunk should be
    /// picked up again before any chunk that hasn't been attempted yet).
    pub async fn push_front(&self, chunk: Chunk) {
        self.inner.lock().await.push_front(chunk);
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
