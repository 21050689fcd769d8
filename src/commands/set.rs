use jiff::{SignedDuration, Timestamp};

use crate::commands::CommandError;
use crate::replication::backlog::Msg;
use crate::resp::RespValue;
use crate::server::{RedisRole, RedisServer};

/// Parsed SET arguments: `SET key value [PX milliseconds]`.
#[derive(Debug, PartialEq)]
pub struct SetArguments {
    pub key: String,
    pub value: String,
    pub expire_ms: Option<i64>,
}

impl SetArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        match arguments.len() {
            2 => Ok(SetArguments {
                key: arguments[0].clone(),
                value: arguments[1].clone(),
                expire_ms: None,
            }),
            4 => {
                if !arguments[2].eq_ignore_ascii_case("px") {
                    return Err(CommandError::InvalidExpireTime);
                }

                let expire_ms = arguments[3]
                    .parse::<i64>()
                    .map_err(|_| CommandError::InvalidExpireTime)?;

                Ok(SetArguments {
                    key: arguments[0].clone(),
                    value: arguments[1].clone(),
                    expire_ms: Some(expire_ms),
                })
            }
            n if n < 2 => Err(CommandError::ExpectingArguments(3)),
            _ => Err(CommandError::ExpectingArguments(5)),
        }
    }

    /// The absolute expiry derived from `PX`, if present.
    pub fn expiration(&self) -> Result<Option<Timestamp>, CommandError> {
        let Some(expire_ms) = self.expire_ms else {
            return Ok(None);
        };

        Timestamp::now()
            .checked_add(SignedDuration::from_millis(expire_ms))
            .map(Some)
            .map_err(|_| CommandError::InvalidExpireTime)
    }

    /// The command frame propagated to replicas:
    /// `[SET, key, value, (px, ms)?]`.
    pub fn propagation_frame(&self) -> RespValue {
        match self.expire_ms {
            Some(expire_ms) => RespValue::command(&[
                "SET",
                &self.key,
                &self.value,
                "px",
                &expire_ms.to_string(),
            ]),
            None => RespValue::command(&["SET", &self.key, &self.value]),
        }
    }
}

/// Handles SET: stores the string, and on a primary additionally enqueues the
/// write onto every replica's backlog before answering `+OK`.
pub async fn set(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;
    let expiration = set_arguments.expiration()?;

    server
        .db()
        .set(&set_arguments.key, set_arguments.value.clone(), expiration)
        .await?;

    if server.role == RedisRole::Master {
        let frame = set_arguments.propagation_frame().encode().into_bytes();
        server.backlog.broadcast(Msg::propagate(frame)).await;
    }

    Ok(RespValue::SimpleString("OK".to_string()).encode())
}
