//! Shard: the execution context that owns one store.
//!
//! Each shard runs as its own tokio task, owning a [`Store`] with no
//! internal locking. Requests arrive over an mpsc channel and responses
//! go back on a per-request oneshot, which gives every facade call the
//! run-to-completion guarantee the store is written against. The same
//! task arms a single timer at the store's earliest pending deadline
//! and runs the expiration sweep when it fires, so a sweep can never
//! interleave with a request.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::entry::Entry;
use crate::error::ShardError;
use crate::key::{fingerprint, LookupKey};
use crate::store::{Store, StoreConfig, StoreStats, TtlResult};
use crate::time;
use crate::types::Value;

/// A protocol-agnostic request sent to a shard.
#[derive(Debug)]
pub enum ShardRequest {
    /// Conditional insert of a fresh value under `key`.
    Insert {
        key: Bytes,
        value: Value,
        ttl_ms: u64,
        nx: bool,
        xx: bool,
    },
    Get {
        key: Bytes,
    },
    Erase {
        key: Bytes,
    },
    Exists {
        key: Bytes,
    },
    Expire {
        key: Bytes,
        ttl_ms: u64,
    },
    Persist {
        key: Bytes,
    },
    Ttl {
        key: Bytes,
    },
    /// Removes every key from this shard.
    FlushAll,
    /// Returns the key count for this shard.
    Len,
    /// Returns aggregate stats for this shard.
    Stats,
}

/// The shard's response to a request.
#[derive(Debug)]
pub enum ShardResponse {
    /// A value clone (or None for a miss).
    Value(Option<Value>),
    /// Boolean result (erase, exists, insert, expire, persist).
    Bool(bool),
    /// TTL query result.
    Ttl(TtlResult),
    /// Key count (Len, FlushAll).
    KeyCount(usize),
    /// Aggregate stats.
    Stats(StoreStats),
    /// An error message.
    Err(String),
}

/// A request bundled with its reply channel.
#[derive(Debug)]
struct ShardMessage {
    request: ShardRequest,
    reply: oneshot::Sender<ShardResponse>,
}

/// A cloneable handle for sending requests to a shard task.
#[derive(Debug, Clone)]
pub struct ShardHandle {
    tx: mpsc::Sender<ShardMessage>,
}

impl ShardHandle {
    /// Sends a request and waits for the response.
    ///
    /// Returns `ShardError::Unavailable` if the shard task has stopped.
    pub async fn send(&self, request: ShardRequest) -> Result<ShardResponse, ShardError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let msg = ShardMessage {
            request,
            reply: reply_tx,
        };
        self.tx.send(msg).await.map_err(|_| ShardError::Unavailable)?;
        reply_rx.await.map_err(|_| ShardError::Unavailable)
    }
}

/// Spawns a shard task and returns the handle for communicating with
/// it. `buffer` controls the mpsc channel capacity.
pub fn spawn_shard(buffer: usize, config: StoreConfig) -> ShardHandle {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(run_shard(rx, config));
    ShardHandle { tx }
}

/// The shard's main loop: serve requests, sweep on deadline, until the
/// channel closes.
async fn run_shard(mut rx: mpsc::Receiver<ShardMessage>, config: StoreConfig) {
    let shard_id = config.shard_id;
    let mut store = Store::with_config(config);

    store.set_expired_entry_releaser(move |store, handle| {
        let entry = store.reclaim(handle);
        trace!(
            shard_id,
            key = %String::from_utf8_lossy(entry.key()),
            "released expired key"
        );
    });

    debug!(shard_id, "shard started");

    loop {
        let deadline = store.timer_deadline().map(time::instant_at);
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        let response = dispatch(&mut store, msg.request);
                        let _ = msg.reply.send(response);
                    }
                    None => break, // channel closed, shard shutting down
                }
            }
            _ = sweep_timer(deadline) => {
                store.sweep();
            }
        }
    }

    debug!(shard_id, "shard stopped");
}

/// Resolves when the armed deadline passes; never, when disarmed.
async fn sweep_timer(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

/// Executes a single request against the store.
fn dispatch(store: &mut Store, request: ShardRequest) -> ShardResponse {
    match request {
        ShardRequest::Insert {
            key,
            value,
            ttl_ms,
            nx,
            xx,
        } => {
            let hash = fingerprint(&key);
            let entry = Entry::with_value(key, hash, value);
            match store.insert_if(entry, ttl_ms, nx, xx) {
                Ok(inserted) => ShardResponse::Bool(inserted),
                Err(e) => ShardResponse::Err(e.to_string()),
            }
        }
        ShardRequest::Get { key } => {
            let value = store.with_entry(&LookupKey::new(&key), |e| e.map(|e| e.value().clone()));
            ShardResponse::Value(value)
        }
        ShardRequest::Erase { key } => ShardResponse::Bool(store.erase(&LookupKey::new(&key))),
        ShardRequest::Exists { key } => ShardResponse::Bool(store.exists(&LookupKey::new(&key))),
        ShardRequest::Expire { key, ttl_ms } => {
            ShardResponse::Bool(store.expire(&LookupKey::new(&key), ttl_ms))
        }
        ShardRequest::Persist { key } => ShardResponse::Bool(store.persist(&LookupKey::new(&key))),
        ShardRequest::Ttl { key } => ShardResponse::Ttl(store.pttl(&LookupKey::new(&key))),
        ShardRequest::FlushAll => {
            store.flush_all();
            ShardResponse::KeyCount(0)
        }
        ShardRequest::Len => ShardResponse::KeyCount(store.len()),
        ShardRequest::Stats => ShardResponse::Stats(store.stats()),
    }
}
