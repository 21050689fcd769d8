//! Primary-side replica handling: the inbound handshake triggered by
//! `REPLCONF listening-port`, the FULLRESYNC snapshot transfer, and the
//! per-replica fan-out loop that drains the backlog channel onto the socket.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::rdb;
use crate::replication::replica_id;
use crate::resp::{RespError, RespReader, RespValue, encode_snapshot_payload};
use crate::server::RedisServer;

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("I/O error: {0}")]
    Io(#[from] tokio::io::Error),
    #[error("RESP error: {0}")]
    Resp(#[from] RespError),
    #[error("handshake rejected: {0}")]
    Rejected(String),
}

/// Drives a replica socket from the `listening-port` announcement onwards:
/// finish the handshake, transfer the empty snapshot, register with the
/// backlog and serve the fan-out loop until the connection dies.
pub async fn serve_replica_connection(
    mut reader: RespReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    server: &Arc<RedisServer>,
    remote_ip: &str,
    listening_port: &str,
) -> Result<(), HandshakeError> {
    // Step 1: acknowledge REPLCONF listening-port.
    write_all(&mut writer, RespValue::SimpleString("OK".to_string()).encode().as_bytes()).await?;

    // Step 2: REPLCONF capa psync2.
    let capabilities = read_command_parts(&mut reader, &mut writer).await?;

    if capabilities.len() != 3 {
        return reject(&mut writer, "expecting 3 arguments").await;
    }

    if !capabilities[0].eq_ignore_ascii_case("replconf")
        || !capabilities[1].eq_ignore_ascii_case("capa")
    {
        return reject(&mut writer, "expecting REPLCONF capa").await;
    }

    if capabilities[2] != "psync2" {
        return reject(&mut writer, "unknown sync").await;
    }

    write_all(&mut writer, RespValue::SimpleString("OK".to_string()).encode().as_bytes()).await?;

    // Step 3: PSYNC ? -1 answered with a full resynchronisation.
    let psync = read_command_parts(&mut reader, &mut writer).await?;

    if psync.len() != 3 {
        return reject(&mut writer, "expecting 3 arguments").await;
    }

    if !psync[0].eq_ignore_ascii_case("psync") {
        return reject(&mut writer, "expecting PSYNC").await;
    }

    let fullresync = RespValue::SimpleString(format!(
        "FULLRESYNC {} {}",
        server.repl_id,
        server.backlog.master_offset()
    ));
    write_all(&mut writer, fullresync.encode().as_bytes()).await?;

    // Step 4: the synthesised empty snapshot, length-prefixed, no trailing
    // CRLF.
    let snapshot = encode_snapshot_payload(&rdb::empty_snapshot());
    write_all(&mut writer, &snapshot).await?;

    // Step 5: register and fan out.
    let id = replica_id(remote_ip, listening_port);
    debug!(replica = %id, "replica synchronised");

    serve_backlog(reader, writer, server, &id).await;

    Ok(())
}

/// Drains the replica's backlog channel onto the socket. Messages flagged
/// `wait_response` are followed by one acknowledgement read; a late
/// acknowledgement is abandoned after the message's timeout.
async fn serve_backlog(
    mut reader: RespReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    server: &Arc<RedisServer>,
    id: &str,
) {
    let mut receiver = server.backlog.register(id).await;

    while let Some(msg) = receiver.recv().await {
        if let Err(e) = write_all(&mut writer, &msg.data).await {
            warn!(replica = id, error = %e, "write to replica failed");
            break;
        }

        if !msg.wait_response {
            continue;
        }

        match timeout(msg.wait_timeout, read_acknowledgement(&mut reader)).await {
            Ok(Ok(offset)) => server.backlog.ack(id, offset).await,
            Ok(Err(e)) => {
                warn!(replica = id, error = %e, "acknowledgement read failed");
                break;
            }
            // The replica may not answer in time; keep replicating.
            Err(_) => continue,
        }
    }

    server.backlog.remove(id).await;
}

/// Reads one `REPLCONF ACK <offset>` frame and extracts the offset.
async fn read_acknowledgement(
    reader: &mut RespReader<OwnedReadHalf>,
) -> Result<u64, HandshakeError> {
    let parts = frame_parts(reader.next_frame().await?)?;

    if parts.len() != 3
        || !parts[0].eq_ignore_ascii_case("replconf")
        || !parts[1].eq_ignore_ascii_case("ack")
    {
        return Err(HandshakeError::Rejected(format!(
            "expected REPLCONF ACK, got {:?}",
            parts
        )));
    }

    parts[2]
        .parse::<u64>()
        .map_err(|_| HandshakeError::Rejected("invalid offset".to_string()))
}

async fn read_command_parts(
    reader: &mut RespReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Result<Vec<String>, HandshakeError> {
    let frame = reader.next_frame().await?;

    match frame_parts(frame) {
        Ok(parts) => Ok(parts),
        Err(e) => {
            let _ = write_all(
                writer,
                RespValue::Error("ERR expecting type array".to_string())
                    .encode()
                    .as_bytes(),
            )
            .await;
            Err(e)
        }
    }
}

fn frame_parts(frame: RespValue) -> Result<Vec<String>, HandshakeError> {
    let RespValue::Array(elements) = frame else {
        return Err(HandshakeError::Rejected("expecting type array".to_string()));
    };

    let mut parts = Vec::with_capacity(elements.len());

    for element in elements {
        let RespValue::BulkString(part) = element else {
            return Err(HandshakeError::Rejected("expecting type array".to_string()));
        };
        parts.push(part);
    }

    Ok(parts)
}

async fn reject(writer: &mut OwnedWriteHalf, message: &str) -> Result<(), HandshakeError> {
    let error = RespValue::Error(format!("ERR {}", message)).encode();
    write_all(writer, error.as_bytes()).await?;

    Err(HandshakeError::Rejected(message.to_string()))
}

async fn write_all(writer: &mut OwnedWriteHalf, bytes: &[u8]) -> tokio::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await?;

    Ok(())
}
