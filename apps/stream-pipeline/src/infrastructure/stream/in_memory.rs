//! In-Memory Stream Transport
//!
//! A process-local implementation of the
//! [`StreamTransport`](crate::application::ports::StreamTransport) port with
//! the same observable semantics as a managed partitioned stream: records
//! with the same partition key land on the same shard in publish order, and
//! LATEST iterators only see records published after their creation.
//!
//! Used by the test suite and by the in-process pipeline binary; a managed
//! cloud stream is wired behind the same port in deployment.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{
    FetchedRecord, IteratorPosition, PutEntry, PutOutcome, RecordBatch, StreamError,
    StreamTransport,
};

#[derive(Debug, Clone)]
struct StoredRecord {
    partition_key: String,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct StreamState {
    shards: Vec<Vec<StoredRecord>>,
}

/// Process-local stream backend.
#[derive(Default)]
pub struct InMemoryTransport {
    streams: Mutex<HashMap<String, StreamState>>,
    iterator_requests: AtomicUsize,
    closed: AtomicBool,
}

impl InMemoryTransport {
    /// Create an empty backend with no streams.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream with the given shard count, replacing any existing
    /// stream of the same name.
    pub fn create_stream(&self, name: &str, shard_count: usize) {
        let shard_count = shard_count.max(1);
        self.streams.lock().insert(
            name.to_string(),
            StreamState {
                shards: vec![Vec::new(); shard_count],
            },
        );
    }

    /// How many shard iterators have been handed out. Lets tests wait until
    /// every reader is positioned before publishing.
    #[must_use]
    pub fn iterator_requests(&self) -> usize {
        self.iterator_requests.load(Ordering::SeqCst)
    }

    /// Record counts per shard of a stream, for routing assertions.
    #[must_use]
    pub fn shard_record_counts(&self, stream: &str) -> Vec<usize> {
        self.streams
            .lock()
            .get(stream)
            .map(|state| state.shards.iter().map(Vec::len).collect())
            .unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StreamError::Transport {
                message: "transport is closed".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn shard_index(partition_key: &str, shard_count: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        partition_key.hash(&mut hasher);
        (hasher.finish() % shard_count as u64) as usize
    }

    fn append(&self, stream: &str, data: Vec<u8>, partition_key: &str) -> Result<(), StreamError> {
        let mut streams = self.streams.lock();
        let state = streams.get_mut(stream).ok_or_else(|| StreamError::Transport {
            message: format!("stream {stream} not found"),
        })?;
        let index = Self::shard_index(partition_key, state.shards.len());
        state.shards[index].push(StoredRecord {
            partition_key: partition_key.to_string(),
            data,
        });
        Ok(())
    }
}

/// Iterator token layout: `stream/shard_index/offset`.
fn encode_iterator(stream: &str, shard: usize, offset: usize) -> String {
    format!("{stream}/{shard}/{offset}")
}

fn decode_iterator(token: &str) -> Result<(String, usize, usize), StreamError> {
    let mut parts = token.rsplitn(3, '/');
    let offset = parts.next().and_then(|p| p.parse::<usize>().ok());
    let shard = parts.next().and_then(|p| p.parse::<usize>().ok());
    let stream = parts.next();
    match (stream, shard, offset) {
        (Some(stream), Some(shard), Some(offset)) => Ok((stream.to_string(), shard, offset)),
        _ => Err(StreamError::Transport {
            message: format!("malformed iterator token: {token}"),
        }),
    }
}

#[async_trait]
impl StreamTransport for InMemoryTransport {
    async fn describe_stream(&self, stream: &str) -> Result<Vec<String>, StreamError> {
        self.ensure_open()?;
        let streams = self.streams.lock();
        let state = streams.get(stream).ok_or_else(|| StreamError::Discovery {
            message: format!("stream {stream} not found"),
        })?;
        Ok((0..state.shards.len())
            .map(|index| format!("shard-{index:04}"))
            .collect())
    }

    async fn get_shard_iterator(
        &self,
        stream: &str,
        shard_id: &str,
        position: IteratorPosition,
    ) -> Result<String, StreamError> {
        self.ensure_open()?;
        let IteratorPosition::Latest = position;
        let index = shard_id
            .strip_prefix("shard-")
            .and_then(|suffix| suffix.parse::<usize>().ok())
            .ok_or_else(|| StreamError::Transport {
                message: format!("unknown shard id: {shard_id}"),
            })?;

        let streams = self.streams.lock();
        let state = streams.get(stream).ok_or_else(|| StreamError::Transport {
            message: format!("stream {stream} not found"),
        })?;
        let shard = state.shards.get(index).ok_or_else(|| StreamError::Transport {
            message: format!("unknown shard id: {shard_id}"),
        })?;

        self.iterator_requests.fetch_add(1, Ordering::SeqCst);
        Ok(encode_iterator(stream, index, shard.len()))
    }

    async fn get_records(&self, iterator: &str, limit: usize) -> Result<RecordBatch, StreamError> {
        self.ensure_open()?;
        let (stream, shard_index, offset) = decode_iterator(iterator)?;

        let streams = self.streams.lock();
        let state = streams.get(&stream).ok_or_else(|| StreamError::Transport {
            message: format!("stream {stream} not found"),
        })?;
        let shard = state
            .shards
            .get(shard_index)
            .ok_or_else(|| StreamError::Transport {
                message: format!("unknown shard index: {shard_index}"),
            })?;

        let end = shard.len().min(offset.saturating_add(limit));
        let start = offset.min(end);
        let records = shard[start..end]
            .iter()
            .map(|record| FetchedRecord {
                partition_key: record.partition_key.clone(),
                data: record.data.clone(),
            })
            .collect();

        // In-memory shards never close.
        Ok(RecordBatch {
            records,
            next_iterator: Some(encode_iterator(&stream, shard_index, end)),
        })
    }

    async fn put_record(
        &self,
        stream: &str,
        data: Vec<u8>,
        partition_key: &str,
    ) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.append(stream, data, partition_key)
    }

    async fn put_records(
        &self,
        stream: &str,
        entries: Vec<PutEntry>,
    ) -> Result<Vec<PutOutcome>, StreamError> {
        self.ensure_open()?;
        let count = entries.len();
        for entry in entries {
            self.append(stream, entry.data, &entry.partition_key)?;
        }
        Ok(vec![PutOutcome::default(); count])
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
