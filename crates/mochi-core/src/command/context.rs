//! What a handler sees while it runs.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use super::argument::ArgValue;
use super::call::{Arguments, ResolvedCommandCall};
use super::definition::Command;
use super::sender::CommandSender;
use super::BoxFuture;
use crate::message::MessageChain;

/// Failure reported by a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The arguments were well-typed but unacceptable; shown to the user.
    #[error("{0}")]
    IllegalArgument(String),
    #[error("{0}")]
    Failed(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        HandlerError::IllegalArgument(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Sender plus resolved call, handed to the overload's handler.
#[derive(Clone)]
pub struct CommandContext {
    sender: Arc<dyn CommandSender>,
    call: Arc<ResolvedCommandCall>,
}

impl CommandContext {
    pub(crate) fn new(sender: Arc<dyn CommandSender>, call: Arc<ResolvedCommandCall>) -> Self {
        Self { sender, call }
    }

    pub fn sender(&self) -> &Arc<dyn CommandSender> {
        &self.sender
    }

    pub fn call(&self) -> &ResolvedCommandCall {
        &self.call
    }

    pub fn command(&self) -> &Arc<Command> {
        self.call.command()
    }

    pub fn args(&self) -> &Arguments {
        self.call.arguments()
    }

    /// Bound value of parameter `name`.
    pub fn arg(&self, name: &str) -> Result<&ArgValue, HandlerError> {
        self.args()
            .get(name)
            .ok_or_else(|| HandlerError::failed(format!("no argument bound to '{}'", name)))
    }

    pub fn reply(&self, message: impl Into<MessageChain>) -> BoxFuture<'_, io::Result<()>> {
        self.sender.send_message(message.into())
    }
}
