//! Per-replica broadcast channels and acknowledgement accounting.
//!
//! Every registered replica owns a bounded FIFO of outbound messages. The
//! backlog tracks, per replica, the cumulative byte count of messages ever
//! enqueued (the expected offset) and the last offset the replica has
//! acknowledged (the current offset). WAIT counts replicas whose current
//! offset has caught up with their expected offset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::resp::RespValue;

/// Bounded capacity of each replica's broadcast channel.
pub const BACKLOG_SIZE_PER_REPLICA: usize = 1000;

/// One outbound message for a replica.
///
/// When `wait_response` is set, the fan-out writer reads one acknowledgement
/// frame after sending, giving up after `wait_timeout`.
#[derive(Debug, Clone)]
pub struct Msg {
    pub data: Vec<u8>,
    pub wait_response: bool,
    pub wait_timeout: Duration,
}

impl Msg {
    pub fn propagate(data: Vec<u8>) -> Self {
        Msg {
            data,
            wait_response: false,
            wait_timeout: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct ReplicaRecord {
    sender: mpsc::Sender<Msg>,
    expected_offset: AtomicU64,
    current_offset: AtomicU64,
}

/// Primary-side replication state: the replica map plus the primary's own
/// write offset.
#[derive(Debug, Default)]
pub struct ReplicationBacklog {
    replicas: RwLock<HashMap<String, ReplicaRecord>>,
    master_offset: AtomicU64,
}

impl ReplicationBacklog {
    pub fn new() -> Self {
        ReplicationBacklog::default()
    }

    /// Cumulative byte count of every write broadcast so far.
    pub fn master_offset(&self) -> u64 {
        self.master_offset.load(Ordering::Acquire)
    }

    /// Creates the record for a newly connected replica and hands back the
    /// receiving half of its broadcast channel.
    pub async fn register(&self, id: &str) -> mpsc::Receiver<Msg> {
        let (sender, receiver) = mpsc::channel(BACKLOG_SIZE_PER_REPLICA);

        let record = ReplicaRecord {
            sender,
            expected_offset: AtomicU64::new(0),
            current_offset: AtomicU64::new(0),
        };

        let mut replicas = self.replicas.write().await;
        replicas.insert(id.to_string(), record);
        debug!(replica = id, "registered replica");

        receiver
    }

    /// Drops a replica's record; its channel closes once the receiver side
    /// is gone.
    pub async fn remove(&self, id: &str) {
        let mut replicas = self.replicas.write().await;
        replicas.remove(id);
        debug!(replica = id, "removed replica");
    }

    pub async fn replica_count(&self) -> usize {
        self.replicas.read().await.len()
    }

    /// Enqueues a copy of `msg` for every registered replica, in the order
    /// the primary accepted the write, and advances each expected offset.
    ///
    /// Sending blocks when a channel is full so per-replica FIFO order is
    /// never broken by drops.
    pub async fn broadcast(&self, msg: Msg) {
        self.master_offset
            .fetch_add(msg.data.len() as u64, Ordering::AcqRel);

        let replicas = self.replicas.read().await;

        for record in replicas.values() {
            record
                .expected_offset
                .fetch_add(msg.data.len() as u64, Ordering::AcqRel);
            let _ = record.sender.send(msg.clone()).await;
        }
    }

    /// Records the offset a replica has acknowledged.
    pub async fn ack(&self, id: &str, offset: u64) {
        let replicas = self.replicas.read().await;

        if let Some(record) = replicas.get(id) {
            record.current_offset.store(offset, Ordering::Release);
        }
    }

    /// Counts the replicas that have caught up with the writes broadcast so
    /// far.
    ///
    /// Each replica that has ever received a write gets a `REPLCONF GETACK *`
    /// probe; after `timeout` (plus a grace period for the acknowledgements
    /// to land) a replica is in sync when its current offset has reached the
    /// expected offset snapshot taken before the probe was enqueued.
    /// Replicas that have never received a write count as in sync.
    pub async fn in_sync(&self, timeout: Duration, want: usize) -> usize {
        let getack = RespValue::command(&["REPLCONF", "GETACK", "*"])
            .encode()
            .into_bytes();

        let mut probed: HashMap<String, u64> = HashMap::new();

        {
            let replicas = self.replicas.read().await;

            for (id, record) in replicas.iter() {
                let expected = record.expected_offset.load(Ordering::Acquire);

                if expected == 0 {
                    continue;
                }

                probed.insert(id.clone(), expected);

                record
                    .expected_offset
                    .fetch_add(getack.len() as u64, Ordering::AcqRel);

                let msg = Msg {
                    data: getack.clone(),
                    wait_response: true,
                    wait_timeout: timeout,
                };
                let _ = record.sender.send(msg).await;
            }
        }

        tokio::time::sleep(timeout + Duration::from_millis(100)).await;

        let replicas = self.replicas.read().await;
        let mut count = 0;

        for (id, record) in replicas.iter() {
            match probed.get(id) {
                Some(expected) => {
                    if record.current_offset.load(Ordering::Acquire) >= *expected {
                        count += 1;
                    }
                }
                None => count += 1,
            }
        }

        debug!(want, count, "replica sync check");

        count
    }
}
