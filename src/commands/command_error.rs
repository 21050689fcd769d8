use thiserror::Error;

use crate::resp::RespValue;
use crate::store::DbError;

/// Errors surfaced to clients as `-ERR …` frames.
///
/// The `Display` implementation carries the exact wire wording; `as_string`
/// wraps it into the encoded RESP error frame.
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("expecting type array")]
    ExpectedArray,
    #[error("empty array")]
    EmptyArray,
    #[error("expecting {0} arguments")]
    ExpectingArguments(usize),
    #[error("expecting at least {0} arguments")]
    ExpectingAtLeastArguments(usize),
    #[error("expecting an even number of field value arguments")]
    UnevenFieldValuePairs,
    #[error("expecting pairs of stream and id")]
    UnpairedStreamKeys,
    #[error("unknown command {0}")]
    UnknownCommand(String),
    #[error("already in MULTI")]
    AlreadyInMulti,
    #[error("EXEC without MULTI")]
    ExecWithoutMulti,
    #[error("DISCARD without MULTI")]
    DiscardWithoutMulti,
    #[error("invalid expire time")]
    InvalidExpireTime,
    #[error("invalid BLOCK duration")]
    InvalidBlockDuration,
    #[error("invalid numreplicas")]
    InvalidNumReplicas,
    #[error("invalid timeout")]
    InvalidTimeout,
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("unsupported INFO section")]
    UnsupportedInfoSection,
    #[error("unknown CONFIG subcommand {0}")]
    UnknownConfigSubcommand(String),
    #[error("unknown sync")]
    UnknownSync,
    #[error("write commands not allowed in replica")]
    WriteOnReplica,
    #[error("{0}")]
    Db(#[from] DbError),
}

impl CommandError {
    /// Renders the canonical RESP error frame for this error.
    pub fn as_string(&self) -> String {
        RespValue::Error(format!("ERR {}", self)).encode()
    }
}
