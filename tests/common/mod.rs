//! Shared helpers for the integration tests: spawning servers on ephemeral
//! listeners and a minimal RESP client speaking over TCP.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use rudis::replication::replica::run_replica;
use rudis::resp::{RespReader, RespValue};
use rudis::server::RedisServer;

/// Spawns a primary server on an ephemeral port.
pub async fn spawn_master() -> (Arc<RedisServer>, SocketAddr) {
    let server = Arc::new(RedisServer::new(vec!["rudis".to_string()]).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let serving = Arc::clone(&server);
    tokio::spawn(async move {
        serving.serve(listener).await;
    });

    (server, address)
}

/// Spawns a replica of the given primary on an ephemeral port, including its
/// outbound replication client.
pub async fn spawn_replica_of(master: SocketAddr) -> (Arc<RedisServer>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let server = Arc::new(
        RedisServer::new(vec![
            "rudis".to_string(),
            "--port".to_string(),
            address.port().to_string(),
            "--replicaof".to_string(),
            format!("127.0.0.1 {}", master.port()),
        ])
        .unwrap(),
    );

    let replicating = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = run_replica(replicating).await;
    });

    let serving = Arc::clone(&server);
    tokio::spawn(async move {
        serving.serve(listener).await;
    });

    (server, address)
}

/// Polls until the primary has registered `count` replicas.
pub async fn wait_for_replicas(master: &Arc<RedisServer>, count: usize) {
    for _ in 0..100 {
        if master.backlog.replica_count().await >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("replicas never registered with the master");
}

/// A test client speaking RESP over a TCP connection.
pub struct TestClient {
    reader: RespReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address).await.unwrap();
        let (read_half, writer) = stream.into_split();

        TestClient {
            reader: RespReader::new(read_half),
            writer,
        }
    }

    /// Sends one command as an array of bulk strings.
    pub async fn send(&mut self, parts: &[&str]) {
        let frame = RespValue::command(parts);
        self.writer
            .write_all(frame.encode().as_bytes())
            .await
            .unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Sends raw bytes, bypassing command framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Reads one reply frame and renders it back to its wire representation.
    pub async fn read_reply(&mut self) -> String {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.reader.next_frame())
            .await
            .expect("timed out waiting for a reply")
            .expect("connection closed while waiting for a reply");

        frame.encode()
    }

    /// Sends a command and returns the reply's wire representation.
    pub async fn round_trip(&mut self, parts: &[&str]) -> String {
        self.send(parts).await;
        self.read_reply().await
    }
}
