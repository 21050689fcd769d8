//! The in-memory keyspace: sixteen logical databases mapping keys to string
//! or stream values.
//!
//! Each database is guarded by one shared/exclusive lock covering both the
//! key mapping and the per-stream subscription lists. String reads take the
//! shared lock; a read that observes an expired key escalates to the
//! exclusive lock to delete it, so the next `GET`/`TYPE` sees absence.

pub mod stream;

use std::collections::HashMap;
use std::sync::Arc;

use jiff::Timestamp;
use regex::Regex;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};

use crate::store::stream::{Stream, StreamEntry, StreamSubscription};

/// Number of logical databases; only database 0 is selected by default.
pub const DATABASE_COUNT: usize = 16;

#[derive(Error, Debug, PartialEq)]
pub enum DbError {
    #[error("wrong data type")]
    WrongType,
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error("invalid entry id: {0}")]
    InvalidEntryId(String),
    #[error("The ID specified in XADD must be greater than 0-0")]
    EntryIdMinValue,
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    EntryIdTooSmall,
}

/// A stored value: either a string with an optional absolute expiry or an
/// append-only stream. The variant never changes after creation.
#[derive(Debug, PartialEq, Clone)]
pub enum DataType {
    String(String),
    Stream(Stream),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Value {
    pub data: DataType,
    pub expiration: Option<Timestamp>,
}

impl Value {
    pub fn string(value: String, expiration: Option<Timestamp>) -> Self {
        Value {
            data: DataType::String(value),
            expiration,
        }
    }
}

fn is_expired(value: &Value) -> bool {
    match value.expiration {
        Some(expiration) => Timestamp::now() > expiration,
        None => false,
    }
}

#[derive(Debug, Default)]
struct DbInner {
    data: HashMap<String, Value>,
    subscriptions: HashMap<String, Vec<StreamSubscription>>,
}

/// One logical database.
#[derive(Debug, Default)]
pub struct Database {
    inner: RwLock<DbInner>,
}

/// Creates the sixteen-database set a server starts with.
pub fn new_database_set() -> Vec<Arc<Database>> {
    (0..DATABASE_COUNT).map(|_| Arc::new(Database::default())).collect()
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    /// Swaps in a snapshot-loaded key mapping, discarding current contents.
    pub async fn install(&self, data: HashMap<String, Value>) {
        self.inner.write().await.data = data;
    }

    /// Returns the stored string, or `None` when the key is absent or its
    /// expiry has passed. Observing an expired key deletes it.
    pub async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        {
            let inner = self.inner.read().await;

            match inner.data.get(key) {
                None => return Ok(None),
                Some(value) if !is_expired(value) => {
                    return match &value.data {
                        DataType::String(content) => Ok(Some(content.clone())),
                        DataType::Stream(_) => Err(DbError::WrongType),
                    };
                }
                Some(_) => {}
            }
        }

        // The key expired under the shared lock; take the exclusive lock and
        // re-check before removing it.
        let mut inner = self.inner.write().await;

        let Some(value) = inner.data.get(key) else {
            return Ok(None);
        };

        if !is_expired(value) {
            return match &value.data {
                DataType::String(content) => Ok(Some(content.clone())),
                DataType::Stream(_) => Err(DbError::WrongType),
            };
        }

        inner.data.remove(key);

        Ok(None)
    }

    /// Stores a string value, replacing any previous string at the key.
    pub async fn set(
        &self,
        key: &str,
        value: String,
        expiration: Option<Timestamp>,
    ) -> Result<(), DbError> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.data.get(key) {
            if matches!(existing.data, DataType::Stream(_)) {
                return Err(DbError::WrongType);
            }
        }

        inner.data.insert(key.to_string(), Value::string(value, expiration));

        Ok(())
    }

    /// Parses the stored value as a base-10 signed 64-bit integer, increments
    /// it and writes back the decimal string. A missing key counts as 0.
    pub async fn incr(&self, key: &str) -> Result<i64, DbError> {
        let mut inner = self.inner.write().await;

        let current = match inner.data.get(key) {
            None => 0,
            Some(value) if is_expired(value) => 0,
            Some(value) => match &value.data {
                DataType::String(content) => {
                    content.parse::<i64>().map_err(|_| DbError::NotAnInteger)?
                }
                DataType::Stream(_) => return Err(DbError::WrongType),
            },
        };

        let incremented = current.checked_add(1).ok_or(DbError::NotAnInteger)?;

        inner
            .data
            .insert(key.to_string(), Value::string(incremented.to_string(), None));

        Ok(incremented)
    }

    /// Returns `"string"`, `"stream"` or `"none"` for the key, honouring the
    /// same expiry discipline as [`Database::get`].
    pub async fn type_of(&self, key: &str) -> &'static str {
        {
            let inner = self.inner.read().await;

            match inner.data.get(key) {
                None => return "none",
                Some(value) if !is_expired(value) => {
                    return match value.data {
                        DataType::String(_) => "string",
                        DataType::Stream(_) => "stream",
                    };
                }
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write().await;

        let Some(value) = inner.data.get(key) else {
            return "none";
        };

        if !is_expired(value) {
            return match value.data {
                DataType::String(_) => "string",
                DataType::Stream(_) => "stream",
            };
        }

        inner.data.remove(key);

        "none"
    }

    /// Returns the live keys matching the compiled pattern.
    pub async fn keys(&self, pattern: &Regex) -> Vec<String> {
        let inner = self.inner.read().await;

        inner
            .data
            .iter()
            .filter(|(key, value)| pattern.is_match(key) && !is_expired(value))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Appends an entry to the stream at `key`, creating the stream on first
    /// write, and wakes every subscription satisfied by the new entry.
    ///
    /// Publication happens while the exclusive lock is held, so subscribers
    /// observe entries in strict `(ts, seq)` order and a subscription
    /// installed before the append cannot miss it.
    pub async fn xadd(
        &self,
        key: &str,
        entry_id: &str,
        fields: Vec<(String, String)>,
    ) -> Result<(u64, u64), DbError> {
        let now_ms = Timestamp::now().as_millisecond() as u64;

        let mut inner = self.inner.write().await;

        let value = inner.data.entry(key.to_string()).or_insert_with(|| Value {
            data: DataType::Stream(Stream::new()),
            expiration: None,
        });

        let DataType::Stream(stream) = &mut value.data else {
            return Err(DbError::WrongType);
        };

        let (ts, seq) = stream.next_entry_id(entry_id, now_ms)?;
        let entry = StreamEntry { ts, seq, fields };
        stream.append(entry.clone());

        publish_entry(&mut inner.subscriptions, key, &entry);

        Ok((ts, seq))
    }

    /// Range query over the stream at `key`; a missing key yields an empty
    /// result.
    pub async fn xrange(
        &self,
        key: &str,
        start: (u64, u64),
        end: (u64, u64),
    ) -> Result<Vec<StreamEntry>, DbError> {
        let inner = self.inner.read().await;

        let Some(value) = inner.data.get(key) else {
            return Ok(Vec::new());
        };

        let DataType::Stream(stream) = &value.data else {
            return Err(DbError::WrongType);
        };

        Ok(stream.range(start, end).to_vec())
    }

    /// Returns the entries strictly greater than `after`.
    pub async fn entries_after(
        &self,
        key: &str,
        after: (u64, u64),
    ) -> Result<Vec<StreamEntry>, DbError> {
        let inner = self.inner.read().await;

        let Some(value) = inner.data.get(key) else {
            return Ok(Vec::new());
        };

        let DataType::Stream(stream) = &value.data else {
            return Err(DbError::WrongType);
        };

        Ok(stream.entries_after(after).to_vec())
    }

    /// The stream's current top `(ts, seq)`, if any.
    pub async fn last_entry_id(&self, key: &str) -> Result<Option<(u64, u64)>, DbError> {
        let inner = self.inner.read().await;

        let Some(value) = inner.data.get(key) else {
            return Ok(None);
        };

        let DataType::Stream(stream) = &value.data else {
            return Err(DbError::WrongType);
        };

        Ok(stream.last_id())
    }

    /// Registers a blocking-read waiter for the next entry on `key` strictly
    /// greater than `(ts, seq)`. The list stays sorted by `(ts, seq)`.
    pub async fn subscribe(
        &self,
        key: &str,
        ts: u64,
        seq: u64,
        sender: mpsc::Sender<(String, StreamEntry)>,
    ) {
        let mut inner = self.inner.write().await;

        let subscriptions = inner.subscriptions.entry(key.to_string()).or_default();
        let position = subscriptions.partition_point(|sub| (sub.ts, sub.seq) <= (ts, seq));

        subscriptions.insert(position, StreamSubscription { ts, seq, sender });
    }
}

/// Delivers `entry` to every subscription with `(sub.ts, sub.seq)` strictly
/// below it, then drops those subscriptions. Deliveries are single-shot.
fn publish_entry(
    subscriptions: &mut HashMap<String, Vec<StreamSubscription>>,
    key: &str,
    entry: &StreamEntry,
) {
    let Some(waiters) = subscriptions.get_mut(key) else {
        return;
    };

    // The list is sorted, so every satisfied subscription sits in the prefix.
    let satisfied = waiters.partition_point(|sub| (sub.ts, sub.seq) < (entry.ts, entry.seq));

    for subscription in waiters.drain(..satisfied) {
        let _ = subscription
            .sender
            .try_send((key.to_string(), entry.clone()));
    }

    if waiters.is_empty() {
        subscriptions.remove(key);
    }
}
