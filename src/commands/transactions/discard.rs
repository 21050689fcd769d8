use crate::commands::CommandError;
use crate::commands::transactions::ClientState;
use crate::resp::RespValue;

/// Handles DISCARD: drops the queued commands and closes the transaction.
///
/// Outside a transaction the error is reported and the connection loop
/// simply continues.
pub fn discard(state: &mut ClientState) -> Result<String, CommandError> {
    if !state.in_multi {
        return Err(CommandError::DiscardWithoutMulti);
    }

    state.in_multi = false;
    state.cmd_queue.clear();

    Ok(RespValue::SimpleString("OK".to_string()).encode())
}

#[cfg(test)]
mod tests {
    use super::discard;
    use crate::commands::transactions::ClientState;
    use crate::commands::{CommandError, CommandHandler};

    #[test]
    fn test_discard_clears_queue() {
        let mut state = ClientState::new();
        state.in_multi = true;
        state.cmd_queue.push(CommandHandler {
            name: "SET".to_string(),
            arguments: vec!["k".to_string(), "v".to_string()],
        });

        assert_eq!(discard(&mut state), Ok("+OK\r\n".to_string()));
        assert!(!state.in_multi);
        assert!(state.cmd_queue.is_empty());

        // Idempotence: a second DISCARD is an error.
        assert_eq!(discard(&mut state), Err(CommandError::DiscardWithoutMulti));
    }
}
