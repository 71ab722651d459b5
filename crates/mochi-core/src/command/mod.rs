//! Command dispatch.
//!
//! Text (or a rich message chain) flows through:
//!
//! 1. [`tokenizer`]: split into argument tokens
//! 2. [`call`]: first token names the command, looked up in the [`registry`]
//! 3. [`executor`]: interceptors and the permission check
//! 4. [`resolver`]: pick the overload and parse arguments through the
//!    command's [`argument`] context
//! 5. the overload's handler, with a [`CommandContext`]

pub mod argument;
pub mod builtin;
pub mod call;
pub mod context;
pub mod definition;
pub mod executor;
pub mod parsers;
pub mod registry;
pub mod resolver;
pub mod sender;
pub mod signature;
pub mod temporal;
pub mod tokenizer;

use std::future::Future;
use std::pin::Pin;

pub use argument::{
    ArgValue, ArgumentParseError, CommandArgumentContext, EnumType, EnumValue, FnParser,
    ParamType, ValueArgumentParser,
};
pub use builtin::{register_builtin_commands, BuiltinCommands};
pub use call::{Arguments, ParsedCommandCall, ResolvedCommandCall};
pub use context::{CommandContext, HandlerError};
pub use definition::{Command, CommandBuilder, CommandKind, CommandOwner};
pub use executor::{
    CommandCallInterceptor, CommandExecuteResult, CommandExecuteStatus, CommandExecutor,
    InterceptResult,
};
pub use registry::CommandRegistry;
pub use resolver::{FailureReason, UnmatchedSignature};
pub use sender::{CollectingSender, CommandSender, ReceiverKind, SenderKind};
pub use signature::{
    CommandDeclarationError, CommandHandler, CommandParameter, CommandSignature,
    SignatureBuilder, ValueParameter,
};
pub use tokenizer::Token;

/// Boxed future used for async trait methods and handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
