use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;
use crate::store::stream::{StreamEntry, resolve_range_end, resolve_range_start};

/// Converts stream entries to their RESP shape: each entry is a 2-element
/// array of the entry ID and the flattened field/value list.
pub fn stream_entries_to_resp(entries: &[StreamEntry]) -> RespValue {
    RespValue::Array(
        entries
            .iter()
            .map(|entry| {
                let mut fields = Vec::with_capacity(entry.fields.len() * 2);

                for (field, value) in &entry.fields {
                    fields.push(RespValue::BulkString(field.clone()));
                    fields.push(RespValue::BulkString(value.clone()));
                }

                RespValue::Array(vec![
                    RespValue::BulkString(entry.id()),
                    RespValue::Array(fields),
                ])
            })
            .collect(),
    )
}

/// Handles `XRANGE key start end`: the entries whose `(ts, seq)` lies in the
/// closed interval. `-` and `+` denote the minimum and maximum IDs.
pub async fn xrange(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    if arguments.len() != 3 {
        return Err(CommandError::ExpectingArguments(4));
    }

    let start = resolve_range_start(&arguments[1])?;
    let end = resolve_range_end(&arguments[2])?;

    let entries = server.db().xrange(&arguments[0], start, end).await?;

    Ok(stream_entries_to_resp(&entries).encode())
}

#[cfg(test)]
mod tests {
    use super::{stream_entries_to_resp, xrange};
    use crate::commands::CommandError;
    use crate::server::RedisServer;
    use crate::store::DbError;
    use crate::store::stream::StreamEntry;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    async fn seeded_server() -> RedisServer {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();

        for (id, field, value) in [("1-1", "a", "1"), ("1-2", "b", "2"), ("2-0", "c", "3")] {
            server
                .db()
                .xadd("s", id, vec![(field.to_string(), value.to_string())])
                .await
                .unwrap();
        }

        server
    }

    #[test]
    fn test_stream_entries_to_resp() {
        let entries = vec![StreamEntry {
            ts: 1,
            seq: 1,
            fields: vec![("temperature".to_string(), "37".to_string())],
        }];

        assert_eq!(
            stream_entries_to_resp(&entries).encode(),
            "*1\r\n*2\r\n$3\r\n1-1\r\n*2\r\n$11\r\ntemperature\r\n$2\r\n37\r\n"
        );
        assert_eq!(stream_entries_to_resp(&[]).encode(), "*0\r\n");
    }

    #[tokio::test]
    async fn test_xrange() {
        let server = seeded_server().await;

        let reply = xrange(&server, &args(&["s", "1-1", "1-2"])).await.unwrap();
        assert!(reply.starts_with("*2\r\n"));
        assert!(reply.contains("$3\r\n1-1\r\n"));
        assert!(reply.contains("$3\r\n1-2\r\n"));

        // Full range via - and +.
        let reply = xrange(&server, &args(&["s", "-", "+"])).await.unwrap();
        assert!(reply.starts_with("*3\r\n"));

        // Endpoints without a sequence cover the whole timestamp.
        let reply = xrange(&server, &args(&["s", "1", "1"])).await.unwrap();
        assert!(reply.starts_with("*2\r\n"));

        // Inverted interval yields an empty reply.
        let reply = xrange(&server, &args(&["s", "2-1", "1-1"])).await.unwrap();
        assert_eq!(reply, "*0\r\n");

        // Missing key yields an empty reply.
        let reply = xrange(&server, &args(&["missing", "-", "+"])).await.unwrap();
        assert_eq!(reply, "*0\r\n");
    }

    #[tokio::test]
    async fn test_xrange_errors() {
        let server = seeded_server().await;

        assert_eq!(
            xrange(&server, &args(&["s", "-"])).await,
            Err(CommandError::ExpectingArguments(4))
        );
        assert!(matches!(
            xrange(&server, &args(&["s", "bogus", "+"])).await,
            Err(CommandError::Db(DbError::InvalidEntryId(_)))
        ));

        server.db().set("plain", "1".to_string(), None).await.unwrap();
        assert_eq!(
            xrange(&server, &args(&["plain", "-", "+"])).await,
            Err(CommandError::Db(DbError::WrongType))
        );
    }
}
