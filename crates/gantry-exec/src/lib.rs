//! Gantry Exec - External command execution for Gantry
//!
//! Commands are described with [`Command`] and run through a [`Session`],
//! which owns the cancellation scope, the async runtime driving child
//! processes, and the label of the task currently running.

pub mod cancel;
pub mod collab;
pub mod command;
pub mod env;
mod runner;
mod signals;
pub mod tee;

pub use cancel::CancelScope;
pub use collab::{
    CommandResolver, IdentityRenderer, PathResolver, Renderer, Tokenizer, WordTokenizer,
};
pub use command::{Command, Input, Output};
pub use runner::{Session, TaskLabel};
pub use tee::{SharedBuffer, Sink, Tee, TeeError};
pub use tokio_util::sync::CancellationToken;
