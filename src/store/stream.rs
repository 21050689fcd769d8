//! Append-only stream values: entry-ID parsing and generation, ordered
//! storage with binary-search range queries, and the subscription records
//! used by blocking reads.

use tokio::sync::mpsc;

use crate::store::DbError;

/// A single immutable stream record keyed by `(ts, seq)`.
///
/// Field/value pairs keep their insertion order.
#[derive(Debug, PartialEq, Clone)]
pub struct StreamEntry {
    pub ts: u64,
    pub seq: u64,
    pub fields: Vec<(String, String)>,
}

impl StreamEntry {
    pub fn id(&self) -> String {
        format_entry_id(self.ts, self.seq)
    }
}

/// An ordered sequence of entries, strictly ascending by `(ts, seq)`.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Stream {
    entries: Vec<StreamEntry>,
}

/// One blocking-read waiter: satisfied by the first appended entry strictly
/// greater than `(ts, seq)`. Delivery is single-shot; the record is removed
/// once its sender has fired.
#[derive(Debug)]
pub struct StreamSubscription {
    pub ts: u64,
    pub seq: u64,
    pub sender: mpsc::Sender<(String, StreamEntry)>,
}

/// How the caller asked the entry ID to be produced.
#[derive(Debug, PartialEq)]
enum EntryIdInput {
    /// `*`: timestamp and sequence both auto-generated.
    Auto,
    /// `<ts>-*`: explicit timestamp, auto-generated sequence.
    AutoSequence(u64),
    /// `<ts>-<seq>`: both explicit.
    Explicit(u64, u64),
}

pub fn format_entry_id(ts: u64, seq: u64) -> String {
    format!("{}-{}", ts, seq)
}

fn parse_add_entry_id(input: &str) -> Result<EntryIdInput, DbError> {
    if input == "*" {
        return Ok(EntryIdInput::Auto);
    }

    let parts = input.split('-').collect::<Vec<&str>>();

    if parts.len() != 2 {
        return Err(DbError::InvalidEntryId(format!(
            "expected <ts>-<seq>, got {:?}",
            input
        )));
    }

    let ts = parts[0]
        .parse::<u64>()
        .map_err(|e| DbError::InvalidEntryId(e.to_string()))?;

    if parts[1] == "*" {
        return Ok(EntryIdInput::AutoSequence(ts));
    }

    let seq = parts[1]
        .parse::<u64>()
        .map_err(|e| DbError::InvalidEntryId(e.to_string()))?;

    if ts == 0 && seq == 0 {
        return Err(DbError::EntryIdMinValue);
    }

    Ok(EntryIdInput::Explicit(ts, seq))
}

/// Parses a range endpoint of the form `<ts>` or `<ts>-<seq>`.
///
/// The sequence part is `None` when omitted; the caller defaults it to the
/// interval edge it represents.
pub fn parse_range_entry_id(input: &str) -> Result<(u64, Option<u64>), DbError> {
    let parts = input.split('-').collect::<Vec<&str>>();

    if parts.len() > 2 {
        return Err(DbError::InvalidEntryId(format!(
            "expected <ts> or <ts>-<seq>, got {:?}",
            input
        )));
    }

    let ts = parts[0]
        .parse::<u64>()
        .map_err(|e| DbError::InvalidEntryId(e.to_string()))?;

    if parts.len() == 1 {
        return Ok((ts, None));
    }

    let seq = parts[1]
        .parse::<u64>()
        .map_err(|e| DbError::InvalidEntryId(e.to_string()))?;

    Ok((ts, Some(seq)))
}

/// Resolves an XRANGE start endpoint: `-` is the minimum ID, an omitted
/// sequence defaults to 0.
pub fn resolve_range_start(input: &str) -> Result<(u64, u64), DbError> {
    if input == "-" {
        return Ok((0, 0));
    }

    let (ts, seq) = parse_range_entry_id(input)?;

    Ok((ts, seq.unwrap_or(0)))
}

/// Resolves an XRANGE end endpoint: `+` is the maximum ID, an omitted
/// sequence defaults to `u64::MAX`.
pub fn resolve_range_end(input: &str) -> Result<(u64, u64), DbError> {
    if input == "+" {
        return Ok((u64::MAX, u64::MAX));
    }

    let (ts, seq) = parse_range_entry_id(input)?;

    Ok((ts, seq.unwrap_or(u64::MAX)))
}

impl Stream {
    pub fn new() -> Self {
        Stream::default()
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    pub fn last_id(&self) -> Option<(u64, u64)> {
        self.entries.last().map(|entry| (entry.ts, entry.seq))
    }

    /// Validates the caller-supplied entry ID against the stream's last entry
    /// and resolves auto-generated parts.
    ///
    /// Auto-generated sequences continue the last entry's sequence when the
    /// timestamps match, otherwise they restart at 0 (or 1 for the reserved
    /// timestamp 0). Explicit IDs must be strictly greater than the last
    /// entry's `(ts, seq)`.
    pub fn next_entry_id(&self, input: &str, now_ms: u64) -> Result<(u64, u64), DbError> {
        let (ts, auto_sequence, explicit_seq) = match parse_add_entry_id(input)? {
            EntryIdInput::Auto => (now_ms, true, 0),
            EntryIdInput::AutoSequence(ts) => (ts, true, 0),
            EntryIdInput::Explicit(ts, seq) => (ts, false, seq),
        };

        let last = self.last_id();

        if auto_sequence {
            return match last {
                Some((last_ts, last_seq)) if last_ts == ts => Ok((ts, last_seq + 1)),
                Some((last_ts, _)) if last_ts > ts => Err(DbError::EntryIdTooSmall),
                _ if ts == 0 => Ok((ts, 1)),
                _ => Ok((ts, 0)),
            };
        }

        if let Some((last_ts, last_seq)) = last {
            if (ts, explicit_seq) <= (last_ts, last_seq) {
                return Err(DbError::EntryIdTooSmall);
            }
        }

        Ok((ts, explicit_seq))
    }

    /// Appends an entry. The caller must have produced the ID through
    /// [`Stream::next_entry_id`], which guarantees strict ordering.
    pub fn append(&mut self, entry: StreamEntry) {
        self.entries.push(entry);
    }

    /// Returns the entries whose `(ts, seq)` falls inside the closed interval
    /// `[start, end]`.
    ///
    /// Both bounds are located with binary searches; an inverted interval
    /// yields an empty slice.
    pub fn range(&self, start: (u64, u64), end: (u64, u64)) -> &[StreamEntry] {
        let start_idx = self
            .entries
            .partition_point(|entry| (entry.ts, entry.seq) < start);
        let end_idx = self
            .entries
            .partition_point(|entry| (entry.ts, entry.seq) <= end);

        if start_idx > end_idx {
            return &[];
        }

        &self.entries[start_idx..end_idx]
    }

    /// Returns the entries strictly greater than `after`.
    pub fn entries_after(&self, after: (u64, u64)) -> &[StreamEntry] {
        let start_idx = self
            .entries
            .partition_point(|entry| (entry.ts, entry.seq) <= after);

        &self.entries[start_idx..]
    }
}
