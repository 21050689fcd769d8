use crate::commands::transactions::ClientState;
use crate::commands::{CommandError, CommandHandler};

/// Handles the state half of EXEC: closes the transaction and hands the
/// queued commands back to the connection loop, which runs them against a
/// sink buffer and frames the collected replies as one array.
pub fn take_queue(state: &mut ClientState) -> Result<Vec<CommandHandler>, CommandError> {
    if !state.in_multi {
        return Err(CommandError::ExecWithoutMulti);
    }

    state.in_multi = false;

    Ok(std::mem::take(&mut state.cmd_queue))
}
