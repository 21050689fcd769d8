use crate::commands::CommandError;
use crate::resp::RespValue;
use crate::server::RedisServer;
use crate::store::stream::format_entry_id;

/// Parsed XADD arguments: `XADD key id field value [field value ...]`.
///
/// Field/value pairs keep their command-line order; streams preserve it.
#[derive(Debug, PartialEq)]
pub struct XaddArguments {
    pub key: String,
    pub entry_id: String,
    pub fields: Vec<(String, String)>,
}

impl XaddArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 4 {
            return Err(CommandError::ExpectingAtLeastArguments(5));
        }

        if arguments[2..].len() % 2 != 0 {
            return Err(CommandError::UnevenFieldValuePairs);
        }

        let fields = arguments[2..]
            .chunks(2)
            .map(|chunk| (chunk[0].clone(), chunk[1].clone()))
            .collect::<Vec<(String, String)>>();

        Ok(XaddArguments {
            key: arguments[0].clone(),
            entry_id: arguments[1].clone(),
            fields,
        })
    }
}

/// Handles XADD: appends an entry to the stream, waking any blocked readers,
/// and answers the generated entry ID as a bulk string.
pub async fn xadd(server: &RedisServer, arguments: &[String]) -> Result<String, CommandError> {
    let xadd_arguments = XaddArguments::parse(arguments)?;

    let (ts, seq) = server
        .db()
        .xadd(
            &xadd_arguments.key,
            &xadd_arguments.entry_id,
            xadd_arguments.fields,
        )
        .await?;

    Ok(RespValue::BulkString(format_entry_id(ts, seq)).encode())
}

#[cfg(test)]
mod tests {
    use super::{XaddArguments, xadd};
    use crate::commands::CommandError;
    use crate::server::RedisServer;
    use crate::store::DbError;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[test]
    fn test_parse() {
        let test_cases = vec![
            (
                args(&["s", "1-1", "a", "1"]),
                Ok(XaddArguments {
                    key: "s".to_string(),
                    entry_id: "1-1".to_string(),
                    fields: vec![("a".to_string(), "1".to_string())],
                }),
            ),
            (
                args(&["s", "*", "a", "1", "b", "2"]),
                Ok(XaddArguments {
                    key: "s".to_string(),
                    entry_id: "*".to_string(),
                    fields: vec![
                        ("a".to_string(), "1".to_string()),
                        ("b".to_string(), "2".to_string()),
                    ],
                }),
            ),
            (args(&["s", "1-1"]), Err(CommandError::ExpectingAtLeastArguments(5))),
            (
                args(&["s", "1-1", "a", "1", "b"]),
                Err(CommandError::UnevenFieldValuePairs),
            ),
        ];

        for (input, expected) in test_cases {
            assert_eq!(XaddArguments::parse(&input), expected, "parsing {:?}", input);
        }
    }

    #[tokio::test]
    async fn test_xadd_replies_generated_id() {
        let server = RedisServer::new(vec!["rudis".to_string()]).unwrap();

        assert_eq!(
            xadd(&server, &args(&["s", "1-1", "a", "1"])).await,
            Ok("$3\r\n1-1\r\n".to_string())
        );
        assert_eq!(
            xadd(&server, &args(&["s", "1-*", "b", "2"])).await,
            Ok("$3\r\n1-2\r\n".to_string())
        );
        assert_eq!(
            xadd(&server, &args(&["s", "1-1", "c", "3"])).await,
            Err(CommandError::Db(DbError::EntryIdTooSmall))
        );
        assert_eq!(
            xadd(&server, &args(&["s", "0-0", "d", "4"])).await,
            Err(CommandError::Db(DbError::EntryIdMinValue))
        );
    }
}
