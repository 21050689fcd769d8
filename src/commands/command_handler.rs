use crate::commands::{
    CommandError, config_get::config, echo::echo, get::get, incr::incr, info::info, keys::keys,
    ping::ping, replconf::replconf, set::set, type_command::type_command, wait::wait, xadd::xadd,
    xrange::xrange, xread::xread,
};
use crate::resp::RespValue;
use crate::server::RedisServer;

/// A parsed command: the case-folded verb and its arguments.
///
/// The dispatcher requires top-level frames to be RESP Arrays of Bulk
/// Strings; anything else is rejected before a handler runs.
#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
}

impl CommandHandler {
    /// Parses a decoded RESP frame into a command.
    ///
    /// # Returns
    ///
    /// * `Err(CommandError::ExpectedArray)` - the frame is not an Array of
    ///   Bulk Strings
    /// * `Err(CommandError::EmptyArray)` - the Array carries no elements
    pub fn from_frame(frame: RespValue) -> Result<Self, CommandError> {
        let RespValue::Array(elements) = frame else {
            return Err(CommandError::ExpectedArray);
        };

        if elements.is_empty() {
            return Err(CommandError::EmptyArray);
        }

        let mut parts = Vec::with_capacity(elements.len());

        for element in elements {
            let RespValue::BulkString(part) = element else {
                return Err(CommandError::ExpectedArray);
            };
            parts.push(part);
        }

        let name = parts.remove(0).to_uppercase();

        Ok(CommandHandler {
            name,
            arguments: parts,
        })
    }

    /// True for verbs that mutate the keyspace and are therefore refused
    /// from ordinary clients on a replica.
    pub fn is_write(&self) -> bool {
        matches!(self.name.as_str(), "SET" | "INCR" | "XADD")
    }

    /// Executes the command and returns its encoded reply.
    pub async fn handle(&self, server: &RedisServer) -> Result<String, CommandError> {
        match self.name.as_str() {
            "PING" => ping(),
            "ECHO" => echo(&self.arguments),
            "GET" => get(server, &self.arguments).await,
            "SET" => set(server, &self.arguments).await,
            "INCR" => incr(server, &self.arguments).await,
            "TYPE" => type_command(server, &self.arguments).await,
            "KEYS" => keys(server, &self.arguments).await,
            "XADD" => xadd(server, &self.arguments).await,
            "XRANGE" => xrange(server, &self.arguments).await,
            "XREAD" => xread(server, &self.arguments).await,
            "CONFIG" => config(server, &self.arguments),
            "INFO" => info(server, &self.arguments),
            "WAIT" => wait(server, &self.arguments).await,
            "REPLCONF" => replconf(server, &self.arguments).await,
            _ => Err(CommandError::UnknownCommand(self.name.clone())),
        }
    }
}
