//! Primary/replica replication: the per-replica backlog, the primary-side
//! handshake and fan-out writer, and the outbound replica client.

pub mod backlog;
pub mod primary;
pub mod replica;

use rand::distr::{Alphanumeric, SampleString};

/// Generates the process-wide replication identifier: 40 random
/// alphanumeric characters.
pub fn generate_replication_id() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 40)
}

/// The backlog key for a replica: its remote IP joined with the listening
/// port it announced.
pub fn replica_id(remote_ip: &str, listening_port: &str) -> String {
    format!("{}-{}", remote_ip, listening_port)
}
