//! The outbound replica client: handshake with the primary, snapshot
//! transfer, then the persistent propagation loop.
//!
//! Propagated commands are applied locally but never answered — the one
//! exception is `REPLCONF GETACK *`, answered with `REPLCONF ACK <n>` where
//! `n` counts the bytes of commands processed *before* the GETACK itself.

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::resp::{RespError, RespReader, RespValue};
use crate::server::{RedisRole, RedisServer};

#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("I/O error: {0}")]
    Io(#[from] tokio::io::Error),
    #[error("RESP error: {0}")]
    Resp(#[from] RespError),
    #[error("invalid response from master: {0}")]
    InvalidResponseFromMaster(String),
    #[error("server is not configured as a replica")]
    NotAReplica,
}

/// Connects to the configured primary, performs the handshake and processes
/// the propagated command stream until the connection closes.
pub async fn run_replica(server: Arc<RedisServer>) -> Result<(), ReplicaError> {
    let RedisRole::Replica((host, port)) = &server.role else {
        return Err(ReplicaError::NotAReplica);
    };

    let stream = TcpStream::connect(format!("{}:{}", host, port)).await?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = RespReader::new(read_half);

    perform_handshake(&mut reader, &mut writer, server.port).await?;
    info!(master = %format!("{}:{}", host, port), "replica synchronised with master");

    // The processed-byte counter starts after the snapshot transfer.
    reader.take_count();

    propagation_loop(reader, writer, server).await
}

/// The four-step handshake:
///
/// ```text
/// → PING                         ← +PONG
/// → REPLCONF listening-port <p>  ← +OK
/// → REPLCONF capa psync2         ← +OK
/// → PSYNC ? -1                   ← +FULLRESYNC <replid> <offset>
///                                ← $<len>\r\n<snapshot bytes>
/// ```
async fn perform_handshake(
    reader: &mut RespReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    own_port: u16,
) -> Result<(), ReplicaError> {
    let reply = exchange(reader, writer, RespValue::command(&["PING"])).await?;

    expect_simple_string(&reply, "PONG")?;

    let reply = exchange(
        reader,
        writer,
        RespValue::command(&["REPLCONF", "listening-port", &own_port.to_string()]),
    )
    .await?;
    expect_simple_string(&reply, "OK")?;

    let reply = exchange(
        reader,
        writer,
        RespValue::command(&["REPLCONF", "capa", "psync2"]),
    )
    .await?;
    expect_simple_string(&reply, "OK")?;

    let reply = exchange(reader, writer, RespValue::command(&["PSYNC", "?", "-1"])).await?;
    validate_fullresync(&reply)?;

    let snapshot = reader.read_snapshot_payload().await?;
    debug!(bytes = snapshot.len(), "received snapshot from master");

    Ok(())
}

async fn exchange(
    reader: &mut RespReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    command: RespValue,
) -> Result<RespValue, ReplicaError> {
    writer.write_all(command.encode().as_bytes()).await?;
    writer.flush().await?;

    Ok(reader.next_frame().await?)
}

fn expect_simple_string(reply: &RespValue, expected: &str) -> Result<(), ReplicaError> {
    if *reply != RespValue::SimpleString(expected.to_string()) {
        return Err(ReplicaError::InvalidResponseFromMaster(format!(
            "expected +{}, got {:?}",
            expected, reply
        )));
    }

    Ok(())
}

/// Validates `+FULLRESYNC <replid> <offset>`: the replication ID is 40
/// alphanumeric characters and the offset is a decimal integer.
fn validate_fullresync(reply: &RespValue) -> Result<(), ReplicaError> {
    let RespValue::SimpleString(line) = reply else {
        return Err(ReplicaError::InvalidResponseFromMaster(format!(
            "expected +FULLRESYNC, got {:?}",
            reply
        )));
    };

    let parts = line.split_whitespace().collect::<Vec<&str>>();

    let repl_id_pattern = Regex::new(r"^[a-zA-Z0-9]{40}$").unwrap();

    if parts.len() != 3
        || parts[0] != "FULLRESYNC"
        || !repl_id_pattern.is_match(parts[1])
        || parts[2].parse::<u64>().is_err()
    {
        return Err(ReplicaError::InvalidResponseFromMaster(line.clone()));
    }

    Ok(())
}

/// Reads propagated command frames forever, applying them locally without
/// replying. The byte counter advances after each command is fully
/// dispatched, so a GETACK reply reports only the bytes of earlier commands.
async fn propagation_loop(
    mut reader: RespReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    server: Arc<RedisServer>,
) -> Result<(), ReplicaError> {
    let mut processed_offset: u64 = 0;

    loop {
        let frame = match reader.next_frame().await {
            Ok(frame) => frame,
            Err(RespError::ConnectionClosed) => {
                info!("master connection closed");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match CommandHandler::from_frame(frame) {
            Ok(command) => {
                if is_getack(&command) {
                    let ack = RespValue::command(&[
                        "REPLCONF",
                        "ACK",
                        &processed_offset.to_string(),
                    ]);
                    writer.write_all(ack.encode().as_bytes()).await?;
                    writer.flush().await?;
                } else if let Err(e) = command.handle(&server).await {
                    debug!(command = %command.name, error = %e, "propagated command failed");
                }
            }
            Err(e) => {
                warn!(error = %e, "malformed propagated frame");
            }
        }

        processed_offset += reader.take_count();
    }
}

fn is_getack(command: &CommandHandler) -> bool {
    command.name == "REPLCONF"
        && command
            .arguments
            .first()
            .is_some_and(|option| option.eq_ignore_ascii_case("getack"))
}
