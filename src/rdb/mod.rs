//! Snapshot (RDB) support: the on-disk loader used at startup and the
//! synthesised empty snapshot sent during a FULLRESYNC.
//!
//! Live writes are never persisted back to disk; the server only reads this
//! format.

pub mod encoding;
pub mod parser;

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

pub use parser::{Snapshot, parse_snapshot};

use crate::rdb::encoding::{encode_int8, encode_int32, encode_string};
use crate::store::{DATABASE_COUNT, Value};

#[derive(Error, Debug, PartialEq)]
pub enum RdbError {
    #[error("invalid magic string")]
    InvalidMagic,
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("unexpected end of snapshot data")]
    UnexpectedEof,
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpCode(u8),
    #[error("unknown aux key: {0}")]
    UnknownAuxKey(String),
    #[error("length must not use the special format")]
    UnexpectedSpecialFormat,
    #[error("unknown special string subtype: {0}")]
    UnknownSpecialSubtype(u8),
    #[error("LZF-compressed strings are not supported")]
    UnsupportedLzf,
    #[error("unsupported value type: 0x{0:02X}")]
    UnsupportedValueType(u8),
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,
    #[error("invalid database index: {0}")]
    InvalidDatabaseIndex(usize),
    #[error("invalid expiry timestamp: {0}")]
    InvalidExpiry(String),
}

/// Loads the snapshot file configured by `dir`/`dbfilename` and returns one
/// key mapping per logical database.
///
/// An unset path or an unreadable file yields a fresh empty sixteen-database
/// set; only a parse failure of an existing file is an error.
pub async fn load_snapshot(
    dir: &str,
    dbfilename: &str,
) -> Result<Vec<HashMap<String, Value>>, RdbError> {
    if dir.is_empty() || dbfilename.is_empty() {
        return Ok(empty_database_set());
    }

    let path = Path::new(dir).join(dbfilename);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            info!(path = %path.display(), error = %e, "snapshot file unreadable, starting empty");
            return Ok(empty_database_set());
        }
    };

    let snapshot = parse_snapshot(&bytes)?;
    debug!(
        version = %snapshot.version,
        keys = snapshot.databases.iter().map(|db| db.len()).sum::<usize>(),
        "loaded snapshot"
    );

    Ok(snapshot.databases)
}

fn empty_database_set() -> Vec<HashMap<String, Value>> {
    (0..DATABASE_COUNT).map(|_| HashMap::new()).collect()
}

/// Builds the fixed empty snapshot transferred to a replica during a full
/// resynchronisation: magic and version, the five aux fields, the EOF opcode
/// and a constant checksum (never verified by the peer).
pub fn empty_snapshot() -> Vec<u8> {
    let mut bytes = b"REDIS0011".to_vec();

    bytes.push(parser::OPCODE_AUX);
    encode_string(&mut bytes, "redis-ver");
    encode_string(&mut bytes, "7.2.0");

    bytes.push(parser::OPCODE_AUX);
    encode_string(&mut bytes, "redis-bits");
    encode_int8(&mut bytes, 64);

    bytes.push(parser::OPCODE_AUX);
    encode_string(&mut bytes, "ctime");
    encode_int32(&mut bytes, 1_829_289_061);

    bytes.push(parser::OPCODE_AUX);
    encode_string(&mut bytes, "used-mem");
    encode_int32(&mut bytes, 2_965_639_168);

    bytes.push(parser::OPCODE_AUX);
    encode_string(&mut bytes, "aof-base");
    encode_int8(&mut bytes, 0);

    bytes.push(parser::OPCODE_EOF);
    bytes.extend_from_slice(&[0xF0, 0x6E, 0x3B, 0xFE, 0xC0, 0xFF, 0x5A, 0xA2]);

    bytes
}
