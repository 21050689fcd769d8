use crate::commands::CommandError;
use crate::commands::transactions::ClientState;
use crate::resp::RespValue;

/// Handles MULTI: opens a transaction for this client.
pub fn multi(state: &mut ClientState) -> Result<String, CommandError> {
    if state.in_multi {
        return Err(CommandError::AlreadyInMulti);
    }

    state.in_multi = true;

    Ok(RespValue::SimpleString("OK".to_string()).encode())
}
