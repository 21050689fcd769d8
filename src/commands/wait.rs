use std::time::Duration;

use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// Handles `WAIT numreplicas timeout`: counts the replicas whose
/// acknowledged offset has caught up with the writes broadcast so far.
///
/// The count may exceed `numreplicas` and may fall short when the timeout
/// elapses first.
pub async fn wait(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() != 2 {
        return Err(CommandError::ExpectingArguments(3));
    }

    let numreplicas = arguments[0]
        .parse::<i64>()
        .map_err(|_| CommandError::InvalidNumReplicas)?;

    if numreplicas < 0 {
        return Err(CommandError::InvalidNumReplicas);
    }

    let timeout_ms = arguments[1]
        .parse::<u64>()
        .map_err(|_| CommandError::InvalidTimeout)?;

    if numreplicas == 0 {
        return Ok(RespValue::Integer(0).encode());
    }

    let count = server
        .backlog
        .in_sync(Duration::from_millis(timeout_ms), numreplicas as usize)
        .await;

    Ok(RespValue::Integer(count as i64).encode())
}

#[cfg(test)]
mod tests {
    use super::wait;
    use crate::commands::CommandError;
    use crate::server::RedisServer;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[tokio::test]
    async fn test_wait_argument_validation() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();

        let test_cases = vec![
            (args(&["1"]), CommandError::ExpectingArguments(3)),
            (args(&["x", "100"]), CommandError::InvalidNumReplicas),
            (args(&["-1", "100"]), CommandError::InvalidNumReplicas),
            (args(&["1", "soon"]), CommandError::InvalidTimeout),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                wait(&server, &input).await,
                Err(expected),
                "validating {:?}",
                input
            );
        }
    }

    #[tokio::test]
    async fn test_wait_zero_replicas_short_circuits() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();

        assert_eq!(wait(&server, &args(&["0", "500"])).await, Ok(":0\r\n".to_string()));
    }

    #[tokio::test]
    async fn test_wait_counts_idle_replicas() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();
        let _receiver = server.backlog.register("replica-1").await;

        // The replica never received a write, so it counts as in sync.
        assert_eq!(wait(&server, &args(&["1", "10"])).await, Ok(":1\r\n".to_string()));
    }
}
