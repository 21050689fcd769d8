use std::time::Duration;

use tokio::sync::mpsc;

use crate::commands::CommandError;
use crate::commands::xrange::stream_entries_to_resp;
use crate::resp::RespValue;
use crate::server::RedisServer;
use crate::store::stream::{StreamEntry, parse_range_entry_id};

/// Parsed XREAD arguments: `XREAD [BLOCK ms] STREAMS key [key ...] id [id ...]`.
#[derive(Debug, PartialEq)]
pub struct XreadArguments {
    pub block_ms: Option<u64>,
    pub pairs: Vec<(String, String)>,
}

impl XreadArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 3 {
            return Err(CommandError::ExpectingAtLeastArguments(4));
        }

        let (block_ms, streams_index) = if arguments[0].eq_ignore_ascii_case("block") {
            let block_ms = arguments[1]
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidBlockDuration)?;

            (Some(block_ms), 2)
        } else {
            (None, 0)
        };

        if !arguments[streams_index].eq_ignore_ascii_case("streams") {
            return Err(CommandError::UnpairedStreamKeys);
        }

        let rest = &arguments[streams_index + 1..];

        if rest.is_empty() || rest.len() % 2 != 0 {
            return Err(CommandError::UnpairedStreamKeys);
        }

        let count = rest.len() / 2;
        let mut pairs = Vec::with_capacity(count);

        for i in 0..count {
            pairs.push((rest[i].clone(), rest[count + i].clone()));
        }

        Ok(XreadArguments { block_ms, pairs })
    }
}

/// Handles XREAD in its three modes: immediate, finite block (sleep then
/// re-evaluate once) and indefinite block (subscribe until an XADD
/// satisfies the filter).
pub async fn xread(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    let xread_arguments = XreadArguments::parse(arguments)?;

    // Resolve each id up front. `$` records the stream's current top at call
    // time, so entries appended during a block are picked up.
    let mut filters: Vec<(String, (u64, u64))> =
        Vec::with_capacity(xread_arguments.pairs.len());

    for (key, id) in &xread_arguments.pairs {
        let after = if id == "$" {
            server.db().last_entry_id(key).await?.unwrap_or((0, 0))
        } else {
            let (ts, seq) = parse_range_entry_id(id)?;
            (ts, seq.unwrap_or(0))
        };

        filters.push((key.clone(), after));
    }

    match xread_arguments.block_ms {
        None => read_streams(server, &filters).await,
        Some(block_ms) if block_ms > 0 => {
            tokio::time::sleep(Duration::from_millis(block_ms)).await;
            read_streams(server, &filters).await
        }
        Some(_) => read_or_subscribe(server, &filters).await,
    }
}

/// One evaluation pass: the entries strictly greater than each filter, or
/// the null bulk when every stream comes up empty.
async fn read_streams(
    server: &RedisServer,
    filters: &[(String, (u64, u64))],
) -> Result<String, CommandError> {
    let mut results = Vec::new();

    for (key, after) in filters {
        let entries = server.db().entries_after(key, *after).await?;

        if !entries.is_empty() {
            results.push(stream_reply(key, &entries));
        }
    }

    if results.is_empty() {
        return Ok(RespValue::NullBulkString.encode());
    }

    Ok(RespValue::Array(results).encode())
}

/// The indefinite-block mode: answer immediately when entries already exist,
/// otherwise park a single-shot subscription per stream and suspend until an
/// XADD delivers.
async fn read_or_subscribe(
    server: &RedisServer,
    filters: &[(String, (u64, u64))],
) -> Result<String, CommandError> {
    let mut results = Vec::new();

    for (key, after) in filters {
        let entries = server.db().entries_after(key, *after).await?;

        if !entries.is_empty() {
            results.push(stream_reply(key, &entries));
        }
    }

    if !results.is_empty() {
        return Ok(RespValue::Array(results).encode());
    }

    let (sender, mut receiver) = mpsc::channel(filters.len().max(1));

    for (key, (ts, seq)) in filters {
        server.db().subscribe(key, *ts, *seq, sender.clone()).await;
    }
    drop(sender);

    match receiver.recv().await {
        Some((key, entry)) => {
            let reply = RespValue::Array(vec![stream_reply(&key, &[entry])]);
            Ok(reply.encode())
        }
        None => Ok(RespValue::NullBulkString.encode()),
    }
}

fn stream_reply(key: &str, entries: &[StreamEntry]) -> RespValue {
    RespValue::Array(vec![
        RespValue::BulkString(key.to_string()),
        stream_entries_to_resp(entries),
    ])
}
