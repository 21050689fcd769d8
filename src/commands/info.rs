use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// Handles `INFO replication`: a bulk string with the role, the replication
/// ID and the primary write offset.
pub fn info(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::ExpectingArguments(2));
    }

    if !arguments[0].eq_ignore_ascii_case("replication") {
        return Err(CommandError::UnsupportedInfoSection);
    }

    let section = format!(
        "role:{}\nmaster_replid:{}\nmaster_repl_offset:{}",
        server.role.as_str(),
        server.repl_id,
        server.backlog.master_offset(),
    );

    Ok(RespValue::BulkString(section).encode())
}

#[cfg(test)]
mod tests {
    use super::info;
    use crate::commands::CommandError;
    use crate::server::RedisServer;

    #[test]
    fn test_info_replication() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();

        let reply = info(&server, &["replication".to_string()]).unwrap();
        assert!(reply.contains("role:master"));
        assert!(reply.contains(&format!("master_replid:{}", server.repl_id)));
        assert!(reply.contains("master_repl_offset:0"));
    }

    #[test]
    fn test_info_replica_role() {
        let server = RedisServer::new(vec![
            "rudis".to_string(),
            "--replicaof".to_string(),
            "127.0.0.1 6380".to_string(),
        ])
        .unwrap();

        let reply = info(&server, &["replication".to_string()]).unwrap();
        assert!(reply.contains("role:slave"));
    }

    #[test]
    fn test_info_rejects_other_sections() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();

        assert_eq!(
            info(&server, &["memory".to_string()]),
            Err(CommandError::UnsupportedInfoSection)
        );
        assert_eq!(info(&server, &[]), Err(CommandError::ExpectingArguments(2)));
    }
}
