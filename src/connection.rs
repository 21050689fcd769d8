//! Per-client connection handling: the RESP read loop, per-connection
//! transaction state and command dispatch.
//!
//! Per-frame errors are reported to the client and the loop continues;
//! framing and socket errors close the connection. A `REPLCONF
//! listening-port` frame hands the socket over to the primary-side replica
//! handshake, after which it never serves client commands again.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{debug, warn};

use crate::commands::transactions::{discard, multi, take_queue};
use crate::commands::{ClientState, CommandError, CommandHandler};
use crate::replication::primary::serve_replica_connection;
use crate::resp::{RespError, RespReader, RespValue};
use crate::server::RedisServer;

pub async fn handle_client_connection(stream: TcpStream, server: Arc<RedisServer>) {
    let peer_address = match stream.peer_addr() {
        Ok(address) => address,
        Err(e) => {
            warn!(error = %e, "failed to get peer address");
            return;
        }
    };

    let (read_half, mut writer) = stream.into_split();
    let mut reader = RespReader::new(read_half);
    let mut state = ClientState::new();

    loop {
        let frame = match reader.next_frame().await {
            Ok(frame) => frame,
            Err(RespError::ConnectionClosed) => break,
            Err(RespError::Io(e)) => {
                debug!(peer = %peer_address, error = %e, "read failed");
                break;
            }
            Err(e) => {
                // Unrecoverable framing: report once, then close.
                let _ = write_reply(&mut writer, &e.as_string()).await;
                break;
            }
        };

        let command = match CommandHandler::from_frame(frame) {
            Ok(command) => command,
            Err(e @ CommandError::ExpectedArray) => {
                let _ = write_reply(&mut writer, &e.as_string()).await;
                break;
            }
            Err(e) => {
                if write_reply(&mut writer, &e.as_string()).await.is_err() {
                    break;
                }
                continue;
            }
        };

        // A replica announcing itself transitions this socket into the
        // replication fan-out; the dispatcher never sees it again.
        if command.name == "REPLCONF"
            && command
                .arguments
                .first()
                .is_some_and(|option| option.eq_ignore_ascii_case("listening-port"))
        {
            if command.arguments.len() != 2 {
                let error = CommandError::ExpectingArguments(3);
                let _ = write_reply(&mut writer, &error.as_string()).await;
                continue;
            }

            let listening_port = command.arguments[1].clone();

            if let Err(e) = serve_replica_connection(
                reader,
                writer,
                &server,
                &peer_address.ip().to_string(),
                &listening_port,
            )
            .await
            {
                warn!(peer = %peer_address, error = %e, "replica connection ended");
            }
            return;
        }

        let reply = match command.name.as_str() {
            "MULTI" => reply_or_error(multi(&mut state)),
            "DISCARD" => reply_or_error(discard(&mut state)),
            "EXEC" => match take_queue(&mut state) {
                Err(e) => e.as_string(),
                Ok(queue) => execute_transaction(queue, &server).await,
            },
            _ if state.in_multi => {
                state.cmd_queue.push(command);
                RespValue::SimpleString("QUEUED".to_string()).encode()
            }
            _ => execute_client_command(&command, &server).await,
        };

        if write_reply(&mut writer, &reply).await.is_err() {
            break;
        }
    }
}

/// Runs one command for a directly connected client, enforcing the replica
/// write protection.
async fn execute_client_command(command: &CommandHandler, server: &RedisServer) -> String {
    if server.is_replica() && command.is_write() {
        return CommandError::WriteOnReplica.as_string();
    }

    match command.handle(server).await {
        Ok(reply) => reply,
        Err(e) => e.as_string(),
    }
}

/// Executes the queued commands in order against a sink buffer and frames
/// the collected replies as a single array.
async fn execute_transaction(queue: Vec<CommandHandler>, server: &RedisServer) -> String {
    let mut replies = Vec::with_capacity(queue.len() + 1);
    replies.push(format!("*{}\r\n", queue.len()));

    for command in &queue {
        replies.push(execute_client_command(command, server).await);
    }

    replies.join("")
}

fn reply_or_error(result: Result<String, CommandError>) -> String {
    match result {
        Ok(reply) => reply,
        Err(e) => e.as_string(),
    }
}

async fn write_reply(writer: &mut OwnedWriteHalf, reply: &str) -> tokio::io::Result<()> {
    writer.write_all(reply.as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}
