use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// Handles `CONFIG GET parameter [parameter ...]`: answers an array of
/// alternating parameter names and values. Unknown parameters are skipped.
pub fn config(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() < 2 {
        return Err(CommandError::ExpectingAtLeastArguments(3));
    }

    if !arguments[0].eq_ignore_ascii_case("get") {
        return Err(CommandError::UnknownConfigSubcommand(arguments[0].clone()));
    }

    let mut pairs = Vec::new();

    for parameter in &arguments[1..] {
        match parameter.as_str() {
            "dir" => {
                pairs.push(RespValue::BulkString("dir".to_string()));
                pairs.push(RespValue::BulkString(server.config.dir.clone()));
            }
            "dbfilename" => {
                pairs.push(RespValue::BulkString("dbfilename".to_string()));
                pairs.push(RespValue::BulkString(server.config.dbfilename.clone()));
            }
            _ => {}
        }
    }

    Ok(RespValue::Array(pairs).encode())
}
