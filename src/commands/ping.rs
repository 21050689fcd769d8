use crate::commands::CommandError;
use crate::resp::RespValue;

/// Handles PING: always answers `+PONG`.
pub fn ping() -> Result<String, CommandError> {
    Ok(RespValue::SimpleString("PONG".to_string()).encode())
}
