//! MULTI/EXEC/DISCARD: a client-scoped queue of commands executed
//! atomically with respect to that client's own command stream.

mod discard;
mod exec;
mod multi;

pub use discard::discard;
pub use exec::take_queue;
pub use multi::multi;

use crate::commands::CommandHandler;

/// Per-connection transaction state, created on accept and destroyed on
/// close.
#[derive(Debug, Default)]
pub struct ClientState {
    pub in_multi: bool,
    pub cmd_queue: Vec<CommandHandler>,
}

impl ClientState {
    pub fn new() -> Self {
        ClientState::default()
    }
}
