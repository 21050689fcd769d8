use crate::commands::CommandError;
use crate::replication::backlog::Msg;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// Handles client-issued REPLCONF.
///
/// `REPLCONF GETACK <arg>` additionally broadcasts the probe to any
/// downstream replicas; the client itself always receives `+OK` on this
/// path. `REPLCONF listening-port` never reaches this handler: the
/// connection loop hands such sockets over to the replica handshake.
pub async fn replconf(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() != 2 {
        return Err(CommandError::ExpectingArguments(3));
    }

    if arguments[0].eq_ignore_ascii_case("getack") {
        let frame = RespValue::command(&["REPLCONF", "GETACK", &arguments[1]])
            .encode()
            .into_bytes();
        server.backlog.broadcast(Msg::propagate(frame)).await;
    }

    Ok(RespValue::SimpleString("OK".to_string()).encode())
}

#[cfg(test)]
mod tests {
    use super::replconf;
    use crate::commands::CommandError;
    use crate::server::RedisServer;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[tokio::test]
    async fn test_replconf_acknowledges() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();

        assert_eq!(
            replconf(&server, &args(&["capa", "psync2"])).await,
            Ok("+OK\r\n".to_string())
        );
        assert_eq!(
            replconf(&server, &args(&["capa"])).await,
            Err(CommandError::ExpectingArguments(3))
        );
    }

    #[tokio::test]
    async fn test_replconf_getack_broadcasts() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();
        let mut receiver = server.backlog.register("replica-1").await;

        assert_eq!(
            replconf(&server, &args(&["GETACK", "*"])).await,
            Ok("+OK\r\n".to_string())
        );

        let msg = receiver.recv().await.unwrap();
        assert_eq!(
            String::from_utf8(msg.data).unwrap(),
            "*3\r\n$8\r\nREPLCONF\r\n$6\r\nGETACK\r\n$1\r\n*\r\n"
        );
    }
}
