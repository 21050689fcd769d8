use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// Handles GET: the stored bytes as a bulk string, or the null bulk when the
/// key is absent or expired.
pub async fn get(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::ExpectingArguments(2));
    }

    match server.db().get(&arguments[0]).await? {
        Some(value) => Ok(RespValue::BulkString(value).encode()),
        None => Ok(RespValue::NullBulkString.encode()),
    }
}
