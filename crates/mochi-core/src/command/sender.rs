//! Command senders.
//!
//! A [`CommandSender`] is whoever issued a command: the console or a chat user
//! in one of several conversation kinds. Senders carry a [`PermitteeId`] and
//! can be replied to.

use std::io;

use parking_lot::Mutex;
use strum::{AsRefStr, Display, EnumString};

use super::BoxFuture;
use crate::message::MessageChain;
use crate::permission::{Permittee, PermitteeId};

/// The conversation a sender is speaking from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SenderKind {
    Console,
    Friend,
    Member,
    Temp,
    Stranger,
}

/// What an overload demands of its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ReceiverKind {
    Any,
    Console,
    /// Any chat user, i.e. not the console.
    User,
    Friend,
    Member,
    Temp,
    Stranger,
}

impl ReceiverKind {
    pub fn accepts(self, kind: SenderKind) -> bool {
        match self {
            ReceiverKind::Any => true,
            ReceiverKind::Console => kind == SenderKind::Console,
            ReceiverKind::User => kind != SenderKind::Console,
            ReceiverKind::Friend => kind == SenderKind::Friend,
            ReceiverKind::Member => kind == SenderKind::Member,
            ReceiverKind::Temp => kind == SenderKind::Temp,
            ReceiverKind::Stranger => kind == SenderKind::Stranger,
        }
    }
}

/// Issuer of a command. Its [`Permittee`] identity decides what it may run.
pub trait CommandSender: Permittee + Send + Sync {
    fn kind(&self) -> SenderKind;

    /// Display name, used in logs and help output.
    fn name(&self) -> String;

    /// Deliver a reply to the sender.
    fn send_message<'a>(&'a self, message: MessageChain) -> BoxFuture<'a, io::Result<()>>;
}

/// Sender that records every reply in memory.
///
/// Useful for embedding (run a command, then inspect what it said) and in
/// tests.
pub struct CollectingSender {
    kind: SenderKind,
    id: PermitteeId,
    name: String,
    messages: Mutex<Vec<MessageChain>>,
}

impl CollectingSender {
    pub fn new(kind: SenderKind, id: PermitteeId) -> Self {
        Self {
            kind,
            id,
            name: id.to_string(),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn console() -> Self {
        Self::new(SenderKind::Console, PermitteeId::Console)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Everything sent so far.
    pub fn messages(&self) -> Vec<MessageChain> {
        self.messages.lock().clone()
    }

    /// Everything sent so far, rendered and joined with newlines.
    pub fn transcript(&self) -> String {
        self.messages
            .lock()
            .iter()
            .map(MessageChain::content)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Permittee for CollectingSender {
    fn permittee_id(&self) -> PermitteeId {
        self.id
    }
}

impl CommandSender for CollectingSender {
    fn kind(&self) -> SenderKind {
        self.kind
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn send_message<'a>(&'a self, message: MessageChain) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.messages.lock().push(message);
            Ok(())
        })
    }
}
