use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;

/// Handles INCR: interprets the stored value as a base-10 signed 64-bit
/// integer and increments it. A missing key counts as 0.
pub async fn incr(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::ExpectingArguments(2));
    }

    let incremented = server.db().incr(&arguments[0]).await?;

    Ok(RespValue::Integer(incremented).encode())
}

#[cfg(test)]
mod tests {
    use super::incr;
    use crate::commands::CommandError;
    use crate::server::RedisServer;
    use crate::store::DbError;

    #[tokio::test]
    async fn test_incr() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();

        server.db().set("n", "41".to_string(), None).await.unwrap();
        assert_eq!(incr(&server, &["n".to_string()]).await, Ok(":42\r\n".to_string()));

        assert_eq!(incr(&server, &["fresh".to_string()]).await, Ok(":1\r\n".to_string()));

        server.db().set("n", "abc".to_string(), None).await.unwrap();
        assert_eq!(
            incr(&server, &["n".to_string()]).await,
            Err(CommandError::Db(DbError::NotAnInteger))
        );

        assert_eq!(incr(&server, &[]).await, Err(CommandError::ExpectingArguments(2)));
    }
}
