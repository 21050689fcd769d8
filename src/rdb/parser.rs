//! Snapshot file parser.
//!
//! Layout: the magic string `REDIS` and a 4-digit ASCII version, an aux
//! section of `[0xFA, key, value]` fields, database sections introduced by
//! `0xFE` with a `0xFB` hash-table-size header followed by the entries, and a
//! trailing `0xFF` with an 8-byte CRC64 (not verified).

use std::collections::HashMap;

use jiff::Timestamp;

use crate::rdb::RdbError;
use crate::rdb::encoding::{ByteReader, decode_length, decode_string};
use crate::store::{DATABASE_COUNT, Value};

pub const OPCODE_AUX: u8 = 0xFA;
pub const OPCODE_RESIZE_DB: u8 = 0xFB;
pub const OPCODE_EXPIRE_TIME_MS: u8 = 0xFC;
pub const OPCODE_EXPIRE_TIME_S: u8 = 0xFD;
pub const OPCODE_DATABASE: u8 = 0xFE;
pub const OPCODE_EOF: u8 = 0xFF;

pub const VALUE_TYPE_STRING: u8 = 0x00;

const MAGIC: &[u8] = b"REDIS";

const RECOGNISED_AUX_KEYS: [&str; 5] =
    ["redis-ver", "redis-bits", "ctime", "used-mem", "aof-base"];

/// The parsed snapshot: metadata plus one key mapping per logical database.
#[derive(Debug, PartialEq)]
pub struct Snapshot {
    pub version: String,
    pub aux: HashMap<String, String>,
    pub databases: Vec<HashMap<String, Value>>,
}

impl Snapshot {
    fn empty(version: String) -> Self {
        Snapshot {
            version,
            aux: HashMap::new(),
            databases: (0..DATABASE_COUNT).map(|_| HashMap::new()).collect(),
        }
    }
}

/// Parses a complete snapshot file.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, RdbError> {
    let mut reader = ByteReader::new(bytes);

    let version = parse_header(&mut reader)?;
    let mut snapshot = Snapshot::empty(version);

    snapshot.aux = parse_aux_section(&mut reader)?;

    let mut current_db = 0usize;

    loop {
        let opcode = reader.read_u8()?;

        match opcode {
            OPCODE_EOF => {
                // Checksum verification is a stub: consume the 8 bytes only.
                reader.read_exact(8)?;
                return Ok(snapshot);
            }
            OPCODE_DATABASE => {
                let index = decode_length(&mut reader)?;

                if index >= DATABASE_COUNT {
                    return Err(RdbError::InvalidDatabaseIndex(index));
                }

                current_db = index;
            }
            OPCODE_RESIZE_DB => {
                let table_size = decode_length(&mut reader)?;
                let _expiry_table_size = decode_length(&mut reader)?;

                let entries = parse_entries(&mut reader, table_size)?;
                snapshot.databases[current_db] = entries;
            }
            other => return Err(RdbError::UnknownOpCode(other)),
        }
    }
}

fn parse_header(reader: &mut ByteReader<'_>) -> Result<String, RdbError> {
    let magic = reader.read_exact(MAGIC.len())?;

    if magic != MAGIC {
        return Err(RdbError::InvalidMagic);
    }

    let version_bytes = reader.read_exact(4)?;
    let version =
        std::str::from_utf8(version_bytes).map_err(|_| RdbError::InvalidUtf8)?;

    if version.parse::<u32>().is_err() {
        return Err(RdbError::InvalidVersion(version.to_string()));
    }

    Ok(version.to_string())
}

fn parse_aux_section(
    reader: &mut ByteReader<'_>,
) -> Result<HashMap<String, String>, RdbError> {
    let mut aux = HashMap::new();

    while !reader.is_empty() && reader.peek_u8()? == OPCODE_AUX {
        reader.read_u8()?;

        let key = decode_string(reader)?;
        let value = decode_string(reader)?;

        if !RECOGNISED_AUX_KEYS.contains(&key.as_str()) {
            return Err(RdbError::UnknownAuxKey(key));
        }

        aux.insert(key, value);
    }

    Ok(aux)
}

fn parse_entries(
    reader: &mut ByteReader<'_>,
    count: usize,
) -> Result<HashMap<String, Value>, RdbError> {
    let mut entries = HashMap::with_capacity(count);

    for _ in 0..count {
        let expiration = parse_expiry(reader)?;

        let value_type = reader.read_u8()?;

        if value_type != VALUE_TYPE_STRING {
            return Err(RdbError::UnsupportedValueType(value_type));
        }

        let key = decode_string(reader)?;
        let value = decode_string(reader)?;

        entries.insert(key, Value::string(value, expiration));
    }

    Ok(entries)
}

fn parse_expiry(reader: &mut ByteReader<'_>) -> Result<Option<Timestamp>, RdbError> {
    match reader.peek_u8()? {
        OPCODE_EXPIRE_TIME_MS => {
            reader.read_u8()?;
            let slice = reader.read_exact(8)?;
            let milliseconds = u64::from_le_bytes([
                slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
            ]);

            let timestamp = Timestamp::from_millisecond(milliseconds as i64)
                .map_err(|e| RdbError::InvalidExpiry(e.to_string()))?;

            Ok(Some(timestamp))
        }
        OPCODE_EXPIRE_TIME_S => {
            reader.read_u8()?;
            let slice = reader.read_exact(4)?;
            let seconds = u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]);

            let timestamp = Timestamp::from_second(seconds as i64)
                .map_err(|e| RdbError::InvalidExpiry(e.to_string()))?;

            Ok(Some(timestamp))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use crate::rdb::RdbError;
    use crate::rdb::encoding::encode_string;
    use crate::store::{DATABASE_COUNT, DataType};

    use super::parse_snapshot;

    fn checksum() -> Vec<u8> {
        vec![0xF0, 0x6E, 0x3B, 0xFE, 0xC0, 0xFF, 0x5A, 0xA2]
    }

    fn snapshot_with_entries(entries: &[u8], count: u8) -> Vec<u8> {
        let mut bytes = b"REDIS0011".to_vec();

        bytes.push(0xFA);
        encode_string(&mut bytes, "redis-ver");
        encode_string(&mut bytes, "7.2.0");

        bytes.push(0xFE);
        bytes.push(0x00);
        bytes.push(0xFB);
        bytes.push(count);
        bytes.push(0x00);
        bytes.extend_from_slice(entries);

        bytes.push(0xFF);
        bytes.extend_from_slice(&checksum());

        bytes
    }

    #[test]
    fn test_parse_plain_entry() {
        let mut entry = vec![0x00u8];
        encode_string(&mut entry, "fruit");
        encode_string(&mut entry, "mango");

        let snapshot = parse_snapshot(&snapshot_with_entries(&entry, 1)).unwrap();

        assert_eq!(snapshot.version, "0011");
        assert_eq!(snapshot.aux.get("redis-ver"), Some(&"7.2.0".to_string()));
        assert_eq!(snapshot.databases.len(), DATABASE_COUNT);

        let value = snapshot.databases[0].get("fruit").unwrap();
        assert_eq!(value.data, DataType::String("mango".to_string()));
        assert_eq!(value.expiration, None);
    }

    #[test]
    fn test_parse_entry_with_ms_expiry() {
        let mut entry = vec![0xFCu8];
        entry.extend_from_slice(&1_700_000_000_000u64.to_le_bytes());
        entry.push(0x00);
        encode_string(&mut entry, "fruit");
        encode_string(&mut entry, "mango");

        let snapshot = parse_snapshot(&snapshot_with_entries(&entry, 1)).unwrap();

        let value = snapshot.databases[0].get("fruit").unwrap();
        let expiration = value.expiration.unwrap();
        assert_eq!(expiration.as_millisecond(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_entry_with_second_expiry() {
        let mut entry = vec![0xFDu8];
        entry.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        entry.push(0x00);
        encode_string(&mut entry, "fruit");
        encode_string(&mut entry, "mango");

        let snapshot = parse_snapshot(&snapshot_with_entries(&entry, 1)).unwrap();

        let value = snapshot.databases[0].get("fruit").unwrap();
        let expiration = value.expiration.unwrap();
        assert_eq!(expiration.as_second(), 1_700_000_000);
    }

    #[test]
    fn test_parse_errors() {
        let mut bad_magic = b"RUDIS0011".to_vec();
        bad_magic.push(0xFF);
        bad_magic.extend_from_slice(&checksum());
        assert_eq!(parse_snapshot(&bad_magic), Err(RdbError::InvalidMagic));

        let mut bad_version = b"REDISxxxx".to_vec();
        bad_version.push(0xFF);
        bad_version.extend_from_slice(&checksum());
        assert_eq!(
            parse_snapshot(&bad_version),
            Err(RdbError::InvalidVersion("xxxx".to_string()))
        );

        let truncated = b"REDIS0011".to_vec();
        assert_eq!(parse_snapshot(&truncated), Err(RdbError::UnexpectedEof));

        let mut unknown_aux = b"REDIS0011".to_vec();
        unknown_aux.push(0xFA);
        encode_string(&mut unknown_aux, "mystery");
        encode_string(&mut unknown_aux, "1");
        assert_eq!(
            parse_snapshot(&unknown_aux),
            Err(RdbError::UnknownAuxKey("mystery".to_string()))
        );

        let mut unknown_opcode = b"REDIS0011".to_vec();
        unknown_opcode.push(0xF9);
        assert_eq!(parse_snapshot(&unknown_opcode), Err(RdbError::UnknownOpCode(0xF9)));
    }

    #[test]
    fn test_parse_multiple_databases() {
        let mut bytes = b"REDIS0011".to_vec();

        for db_index in [0u8, 3u8] {
            bytes.push(0xFE);
            bytes.push(db_index);
            bytes.push(0xFB);
            bytes.push(1);
            bytes.push(0);
            bytes.push(0x00);
            encode_string(&mut bytes, "key");
            encode_string(&mut bytes, &format!("db{}", db_index));
        }

        bytes.push(0xFF);
        bytes.extend_from_slice(&checksum());

        let snapshot = parse_snapshot(&bytes).unwrap();
        assert_eq!(
            snapshot.databases[0].get("key").unwrap().data,
            DataType::String("db0".to_string())
        );
        assert_eq!(
            snapshot.databases[3].get("key").unwrap().data,
            DataType::String("db3".to_string())
        );
        assert!(snapshot.databases[1].is_empty());
    }
}
