use crate::commands::CommandError;
use crate::resp::RespValue;

/// Handles ECHO: replies the message back as a bulk string.
pub fn echo(arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::ExpectingArguments(2));
    }

    Ok(RespValue::BulkString(arguments[0].clone()).encode())
}
