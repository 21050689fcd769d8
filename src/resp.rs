//! RESP (REdis Serialization Protocol) framing.
//!
//! Encoding is infallible and produces the exact byte representation of each
//! frame type. Decoding is stream-oriented: [`RespReader`] wraps a TCP read
//! half (or anything `AsyncRead`) and consumes one frame at a time, tracking
//! every byte it reads so the replica path can account for processed
//! command bytes.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP type '{0}'")]
    UnknownType(char),
    #[error("invalid length prefix")]
    InvalidLength,
    #[error("invalid bulk string")]
    InvalidBulkString,
    #[error("missing CRLF terminator")]
    MissingTerminator,
}

impl RespError {
    /// Renders the error as the RESP error frame reported to clients.
    pub fn as_string(&self) -> String {
        RespValue::Error(format!("ERR {}", self)).encode()
    }
}

impl From<std::io::Error> for RespError {
    fn from(err: std::io::Error) -> Self {
        RespError::Io(err.to_string())
    }
}

/// A single RESP frame.
///
/// Only the five framed types the protocol needs are represented, plus the
/// null bulk string (`$-1\r\n`) used for absent values.
#[derive(Debug, PartialEq, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    NullBulkString,
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Encodes the frame into its wire representation.
    ///
    /// Every frame terminates with CRLF; arrays concatenate the encodings of
    /// their elements after the `*<n>\r\n` header.
    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(value) => format!("+{}\r\n", value),
            RespValue::Error(value) => format!("-{}\r\n", value),
            RespValue::Integer(value) => format!(":{}\r\n", value),
            RespValue::BulkString(value) => format!("${}\r\n{}\r\n", value.len(), value),
            RespValue::NullBulkString => "$-1\r\n".to_string(),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());

                for element in elements {
                    encoded.push_str(&element.encode());
                }

                encoded
            }
        }
    }

    /// Builds the array-of-bulk-strings frame used for commands.
    pub fn command(parts: &[&str]) -> RespValue {
        RespValue::Array(
            parts
                .iter()
                .map(|part| RespValue::BulkString(part.to_string()))
                .collect(),
        )
    }
}

/// Stream-oriented RESP decoder over an async reader.
///
/// Every successfully consumed byte increments an internal counter which can
/// be read-and-reset with [`RespReader::take_count`]. On a replica this
/// counter is the cumulative processed-command byte count that REPLCONF
/// GETACK reports back to the primary.
pub struct RespReader<R> {
    reader: BufReader<R>,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin + Send> RespReader<R> {
    pub fn new(inner: R) -> Self {
        RespReader {
            reader: BufReader::new(inner),
            bytes_read: 0,
        }
    }

    /// Returns the byte count accumulated since the last call and resets it.
    pub fn take_count(&mut self) -> u64 {
        let count = self.bytes_read;
        self.bytes_read = 0;
        count
    }

    /// Reads one delimited line terminated by `\n`, stripping the CRLF.
    async fn read_line(&mut self) -> Result<String, RespError> {
        let mut line = Vec::new();
        let read = self.reader.read_until(b'\n', &mut line).await?;

        if read == 0 {
            return Err(RespError::ConnectionClosed);
        }

        self.bytes_read += read as u64;

        let text = std::str::from_utf8(&line).map_err(|_| RespError::InvalidUtf8)?;

        Ok(text.trim_end_matches('\n').trim_end_matches('\r').to_string())
    }

    async fn read_exact_counted(&mut self, buffer: &mut [u8]) -> Result<(), RespError> {
        self.reader.read_exact(buffer).await?;
        self.bytes_read += buffer.len() as u64;

        Ok(())
    }

    /// Consumes and decodes a single top-level frame.
    ///
    /// Arrays are decoded recursively: the element count is read first, then
    /// `n` nested frames.
    pub async fn next_frame(&mut self) -> Result<RespValue, RespError> {
        let line = self.read_line().await?;

        self.decode_frame(line).await
    }

    // The recursive future is boxed and type-erased: arrays decode through
    // decode_frame again for each nested element.
    fn decode_frame<'a>(
        &'a mut self,
        line: String,
    ) -> Pin<Box<dyn Future<Output = Result<RespValue, RespError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(first_char) = line.chars().next() else {
                return Err(RespError::UnknownType(' '));
            };
            let payload = &line[first_char.len_utf8()..];

            match first_char {
                '+' => Ok(RespValue::SimpleString(payload.to_string())),
                '-' => Ok(RespValue::Error(payload.to_string())),
                ':' => {
                    let value = payload.parse::<i64>().map_err(|_| RespError::InvalidLength)?;
                    Ok(RespValue::Integer(value))
                }
                '$' => self.decode_bulk_string(payload).await,
                '*' => {
                    let length = payload
                        .parse::<usize>()
                        .map_err(|_| RespError::InvalidLength)?;

                    let mut elements = Vec::with_capacity(length);

                    for _ in 0..length {
                        let element_line = self.read_line().await?;
                        let element = self.decode_frame(element_line).await?;
                        elements.push(element);
                    }

                    Ok(RespValue::Array(elements))
                }
                other => Err(RespError::UnknownType(other)),
            }
        })
    }

    async fn decode_bulk_string(&mut self, length_prefix: &str) -> Result<RespValue, RespError> {
        if length_prefix == "-1" {
            return Ok(RespValue::NullBulkString);
        }

        let length = length_prefix
            .parse::<usize>()
            .map_err(|_| RespError::InvalidLength)?;

        let mut content = vec![0u8; length];
        self.read_exact_counted(&mut content).await?;

        let mut terminator = [0u8; 2];
        self.read_exact_counted(&mut terminator).await?;

        if &terminator != b"\r\n" {
            return Err(RespError::MissingTerminator);
        }

        let content = String::from_utf8(content).map_err(|_| RespError::InvalidUtf8)?;

        Ok(RespValue::BulkString(content))
    }

    /// Reads the non-RESP snapshot transfer frame: `$<len>\r\n<binary>` with
    /// no trailing CRLF after the binary payload.
    pub async fn read_snapshot_payload(&mut self) -> Result<Vec<u8>, RespError> {
        let line = self.read_line().await?;

        let Some(length_prefix) = line.strip_prefix('$') else {
            return Err(RespError::InvalidBulkString);
        };

        let length = length_prefix
            .parse::<usize>()
            .map_err(|_| RespError::InvalidLength)?;

        let mut payload = vec![0u8; length];
        self.read_exact_counted(&mut payload).await?;

        Ok(payload)
    }
}

/// Frames a raw binary blob for the snapshot transfer: length-prefixed like a
/// bulk string but without the trailing CRLF.
pub fn encode_snapshot_payload(bytes: &[u8]) -> Vec<u8> {
    let mut framed = format!("${}\r\n", bytes.len()).into_bytes();
    framed.extend_from_slice(bytes);

    framed
}
