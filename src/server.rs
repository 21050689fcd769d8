//! Server configuration and the accept loop.
//!
//! Parses the command-line flags, owns the sixteen logical databases, the
//! replication identity and the per-replica backlog, and spawns one task per
//! accepted connection. A server configured with `--replicaof` additionally
//! runs the outbound replica client.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::connection::handle_client_connection;
use crate::replication;
use crate::replication::backlog::ReplicationBacklog;
use crate::store::{Database, Value, new_database_set};

/// Errors that can occur during command-line argument parsing.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("invalid port flag value")]
    InvalidPortFlagValue,
    #[error("invalid master address")]
    InvalidMasterAddress,
    #[error("invalid master port")]
    InvalidMasterPort,
    #[error("--dbfilename requires --dir")]
    DbFilenameWithoutDir,
}

/// The server's replication role.
#[derive(Debug, PartialEq, Clone)]
pub enum RedisRole {
    /// Accepts writes and propagates them to replicas.
    Master,
    /// Follows the primary at the given (host, port).
    Replica((String, u16)),
}

impl RedisRole {
    /// The role name reported by INFO ("slave" keeps the historical Redis
    /// wording).
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisRole::Master => "master",
            RedisRole::Replica(_) => "slave",
        }
    }
}

/// Snapshot location settings surfaced through CONFIG GET.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct StorageConfig {
    pub dir: String,
    pub dbfilename: String,
}

/// Shared server state: configuration plus the database set and the
/// replication backlog.
#[derive(Debug)]
pub struct RedisServer {
    pub port: u16,
    pub role: RedisRole,
    /// Random 40-character alphanumeric replication identifier.
    pub repl_id: String,
    pub config: StorageConfig,
    pub databases: Vec<Arc<Database>>,
    pub backlog: Arc<ReplicationBacklog>,
}

impl RedisServer {
    /// Builds a server from command-line arguments.
    ///
    /// # Supported flags
    ///
    /// * `--port <port>` - listen port (default 6379)
    /// * `--replicaof "<host> <port>"` - run as replica of the given primary
    /// * `--dir <path>` - snapshot directory
    /// * `--dbfilename <name>` - snapshot filename (requires `--dir`)
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut port: Option<u16> = None;
        let mut role: Option<RedisRole> = None;
        let mut config = StorageConfig::default();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let value = flag_value(&mut iter)?;
                    port = Some(parse_port(&value, CliError::InvalidPortFlagValue)?);
                }
                "--replicaof" => {
                    let value = flag_value(&mut iter)?;
                    let (host, master_port) = parse_master_address(&value)?;
                    role = Some(RedisRole::Replica((host, master_port)));
                }
                "--dir" => {
                    config.dir = flag_value(&mut iter)?;
                }
                "--dbfilename" => {
                    config.dbfilename = flag_value(&mut iter)?;
                }
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        if !config.dbfilename.is_empty() && config.dir.is_empty() {
            return Err(CliError::DbFilenameWithoutDir);
        }

        Ok(RedisServer {
            port: port.unwrap_or(6379),
            role: role.unwrap_or(RedisRole::Master),
            repl_id: replication::generate_replication_id(),
            config,
            databases: new_database_set(),
            backlog: Arc::new(ReplicationBacklog::new()),
        })
    }

    /// The selected database. Commands always operate on database 0.
    pub fn db(&self) -> &Arc<Database> {
        &self.databases[0]
    }

    pub fn is_replica(&self) -> bool {
        matches!(self.role, RedisRole::Replica(_))
    }

    /// Installs the snapshot-loaded contents into the database set.
    pub async fn install_snapshot(&self, snapshots: Vec<HashMap<String, Value>>) {
        for (database, snapshot) in self.databases.iter().zip(snapshots) {
            database.install(snapshot).await;
        }
    }

    /// Binds the listener, starts the replica client when configured, and
    /// serves until shutdown.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(format!("127.0.0.1:{}", self.port))
            .await
            .with_context(|| format!("failed to bind port {}", self.port))?;

        info!(port = self.port, role = self.role.as_str(), "listening");

        if self.is_replica() {
            let server = Arc::clone(&self);

            tokio::spawn(async move {
                if let Err(e) = replication::replica::run_replica(server).await {
                    error!(error = %e, "replica client terminated");
                }
            });
        }

        self.serve(listener).await;

        Ok(())
    }

    /// Accepts connections until the listener fails or ctrl-c arrives,
    /// handling each client in its own task.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let server = Arc::clone(self);

                        tokio::spawn(async move {
                            handle_client_connection(stream, server).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            }
        }
    }
}

fn flag_value<I: Iterator<Item = String>>(iter: &mut I) -> Result<String, CliError> {
    iter.next().ok_or(CliError::InvalidCommandLineFlag)
}

/// Parses a TCP port. `u16` rejects anything above 65535 on its own; port 0
/// is additionally refused because nothing could ever connect to it.
fn parse_port(value: &str, error: CliError) -> Result<u16, CliError> {
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(error),
        Ok(port) => Ok(port),
    }
}

/// Parses a `--replicaof "<host> <port>"` value: exactly two
/// whitespace-separated fields, where the host is an IPv4 address or a
/// hostname.
fn parse_master_address(value: &str) -> Result<(String, u16), CliError> {
    let mut fields = value.split_whitespace();

    let (Some(host), Some(port), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(CliError::InvalidMasterAddress);
    };

    if !is_valid_host(host) {
        return Err(CliError::InvalidMasterAddress);
    }

    let port = parse_port(port, CliError::InvalidMasterPort)?;

    Ok((host.to_string(), port))
}

/// A host is either a well-formed IPv4 address or a hostname made of
/// ASCII alphanumerics, `-` and `.`.
fn is_valid_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }

    if host.parse::<Ipv4Addr>().is_ok() {
        return true;
    }

    // Dotted-digit strings that failed the IPv4 parse ("300.1.1.1",
    // "1.2.3") must not pass as hostnames.
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return false;
    }

    host.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        let mut all = vec!["rudis".to_string()];
        all.extend(parts.iter().map(|part| part.to_string()));
        all
    }

    #[test]
    fn test_parse_port() {
        let test_cases = vec![
            ("6379", Ok(6379)),
            ("7001", Ok(7001)),
            ("65535", Ok(65535)),
            ("0", Err(CliError::InvalidPortFlagValue)),
            ("65536", Err(CliError::InvalidPortFlagValue)),
            ("-6379", Err(CliError::InvalidPortFlagValue)),
            ("6379.5", Err(CliError::InvalidPortFlagValue)),
            ("sixthousand", Err(CliError::InvalidPortFlagValue)),
            ("", Err(CliError::InvalidPortFlagValue)),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                parse_port(input, CliError::InvalidPortFlagValue),
                expected,
                "parsing port {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_master_address() {
        let test_cases = vec![
            ("127.0.0.1 6379", Ok(("127.0.0.1".to_string(), 6379))),
            (
                "replica-upstream.internal 7001",
                Ok(("replica-upstream.internal".to_string(), 7001)),
            ),
            ("localhost 6380", Ok(("localhost".to_string(), 6380))),
            ("10.0.0.7 0", Err(CliError::InvalidMasterPort)),
            ("10.0.0.7 sixty", Err(CliError::InvalidMasterPort)),
            ("300.1.1.1 6379", Err(CliError::InvalidMasterAddress)),
            ("1.2.3 6379", Err(CliError::InvalidMasterAddress)),
            ("pri_mary 6379", Err(CliError::InvalidMasterAddress)),
            ("primary", Err(CliError::InvalidMasterAddress)),
            ("primary 6379 trailing", Err(CliError::InvalidMasterAddress)),
            ("", Err(CliError::InvalidMasterAddress)),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                parse_master_address(input),
                expected,
                "parsing master address {:?}",
                input
            );
        }
    }

    #[test]
    fn test_is_valid_host() {
        let test_cases = vec![
            ("192.168.1.40", true),
            ("primary", true),
            ("redis-primary.prod.example", true),
            ("999.999.999.999", false),
            ("10.0", false),
            ("pri mary", false),
            ("primary!", false),
            ("", false),
        ];

        for (input, expected) in test_cases {
            assert_eq!(is_valid_host(input), expected, "validating host {:?}", input);
        }
    }

    #[test]
    fn test_server_creation_defaults() {
        let server = RedisServer::new(args(&[])).unwrap();

        assert_eq!(server.port, 6379);
        assert_eq!(server.role, RedisRole::Master);
        assert_eq!(server.repl_id.len(), 40);
        assert_eq!(server.databases.len(), 16);
        assert_eq!(server.config, StorageConfig::default());
    }

    #[test]
    fn test_server_creation_success_cases() {
        let test_cases = vec![
            (args(&["--port", "6677"]), 6677, RedisRole::Master),
            (
                args(&["--replicaof", "127.0.0.1 6380"]),
                6379,
                RedisRole::Replica(("127.0.0.1".to_string(), 6380)),
            ),
            (
                args(&["--port", "7000", "--replicaof", "primary.internal 6381"]),
                7000,
                RedisRole::Replica(("primary.internal".to_string(), 6381)),
            ),
        ];

        for (input, expected_port, expected_role) in test_cases {
            let server = RedisServer::new(input).unwrap();
            assert_eq!(server.port, expected_port);
            assert_eq!(server.role, expected_role);
        }
    }

    #[test]
    fn test_server_creation_storage_flags() {
        let server = RedisServer::new(args(&[
            "--dir",
            "/tmp/snapshots",
            "--dbfilename",
            "dump.rdb",
        ]))
        .unwrap();

        assert_eq!(server.config.dir, "/tmp/snapshots");
        assert_eq!(server.config.dbfilename, "dump.rdb");

        // --dbfilename without --dir is rejected at startup.
        assert_eq!(
            RedisServer::new(args(&["--dbfilename", "dump.rdb"])).unwrap_err(),
            CliError::DbFilenameWithoutDir
        );
    }

    #[test]
    fn test_server_creation_invalid_flags() {
        let test_cases = vec![
            (args(&["--port"]), CliError::InvalidCommandLineFlag),
            (args(&["--port", "0"]), CliError::InvalidPortFlagValue),
            (args(&["--port", "101010"]), CliError::InvalidPortFlagValue),
            (args(&["--verbose"]), CliError::InvalidCommandLineFlag),
            (args(&["--replicaof"]), CliError::InvalidCommandLineFlag),
            (args(&["--replicaof", "primary"]), CliError::InvalidMasterAddress),
            (
                args(&["--replicaof", "primary zero"]),
                CliError::InvalidMasterPort,
            ),
            (args(&["--dir"]), CliError::InvalidCommandLineFlag),
        ];

        for (input, expected) in test_cases {
            assert_eq!(RedisServer::new(input).unwrap_err(), expected);
        }
    }
}
