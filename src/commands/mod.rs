//! Command handlers, one module per verb, dispatched by
//! [`CommandHandler::handle`].

mod command_error;
mod command_handler;
mod config_get;
mod echo;
mod get;
mod incr;
mod info;
mod keys;
mod ping;
mod replconf;
mod set;
mod type_command;
mod wait;
mod xadd;
mod xrange;
mod xread;

pub mod transactions;

pub use command_error::CommandError;
pub use command_handler::CommandHandler;
pub use transactions::ClientState;
