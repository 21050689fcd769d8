use regex::Regex;

use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// Handles KEYS: `*` matches everything, any other pattern compiles as a
/// regular expression.
pub async fn keys(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::ExpectingArguments(2));
    }

    let pattern = if arguments[0] == "*" {
        ".*"
    } else {
        arguments[0].as_str()
    };

    let regex = Regex::new(pattern).map_err(|e| CommandError::InvalidPattern(e.to_string()))?;

    let matched = server.db().keys(&regex).await;

    Ok(RespValue::Array(
        matched
            .into_iter()
            .map(RespValue::BulkString)
            .collect::<Vec<RespValue>>(),
    )
    .encode())
}
