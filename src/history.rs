use crate::protocol::SessionId;
use tokio::sync::Mutex;

/// One completed exchange: a user's raw utterance and the reply that was
/// generated for it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub session_id: SessionId,
    pub raw: String,
    pub generated: String,
}

/// Fixed-capacity ring buffer of past exchanges, shared by all pipelines.
///
/// Once full, each push evicts exactly the oldest entry. Every operation
/// takes the single internal lock, so concurrent pipelines never observe
/// a torn buffer state.
pub struct HistoryStore {
    inner: Mutex<Ring>,
}

struct Ring {
    buffer: Vec<Option<HistoryEntry>>,
    /// Next write position. When the ring is full this is also the
    /// oldest entry, so an overflowing push overwrites it in place.
    tail: usize,
    count: usize,
}

impl HistoryStore {
    /// Create a store holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            inner: Mutex::new(Ring {
                buffer: vec![None; capacity],
                tail: 0,
                count: 0,
            }),
        }
    }

    /// Append an entry, evicting the oldest one if the buffer is full.
    pub async fn push(&self, entry: HistoryEntry) {
        let mut ring = self.inner.lock().await;
        let capacity = ring.buffer.len();
        if ring.count < capacity {
            ring.count += 1;
        }
        let tail = ring.tail;
        ring.buffer[tail] = Some(entry);
        ring.tail = (ring.tail + 1) % capacity;
    }

    /// Return a copy of the last `n` entries, oldest first. Returns fewer
    /// than `n` when the buffer holds fewer.
    pub async fn last_n(&self, n: usize) -> Vec<HistoryEntry> {
        let ring = self.inner.lock().await;
        let capacity = ring.buffer.len();
        let take = n.min(ring.count);
        let start = (ring.tail + capacity - take) % capacity;

        (0..take)
            .filter_map(|i| ring.buffer[(start + i) % capacity].clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.count
    }

    pub async fn clear(&self) {
        let mut ring = self.inner.lock().await;
        ring.buffer.fill(None);
        ring.tail = 0;
        ring.count = 0;
    }
}
