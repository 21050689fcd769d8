use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// Handles TYPE: `+string`, `+stream` or `+none`.
pub async fn type_command(
    server: &RedisServer,
    arguments: &[String],
) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::ExpectingArguments(2));
    }

    let type_name = server.db().type_of(&arguments[0]).await;

    Ok(RespValue::SimpleString(type_name.to_string()).encode())
}
