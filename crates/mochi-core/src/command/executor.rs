//! Command execution pipeline.
//!
//! `execute_command` runs: parse → intercept call → permission check →
//! resolve → intercept resolved call → invoke. Every outcome is a
//! [`CommandExecuteResult`]; nothing here returns `Err` or panics, and the
//! executor never talks to the sender itself.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::RwLock;
use strum::AsRefStr;

use super::call::{ParsedCommandCall, ResolvedCommandCall};
use super::context::{CommandContext, HandlerError};
use super::definition::Command;
use super::registry::CommandRegistry;
use super::resolver::{resolve, ResolveError, UnmatchedSignature};
use super::sender::CommandSender;
use super::tokenizer::tokenize;
use crate::message::MessageChain;
use crate::permission::PermissionService;

/// Verdict of an interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptResult {
    Continue,
    Reject(String),
}

/// Hook that can veto a call before or after resolution.
pub trait CommandCallInterceptor: Send + Sync {
    fn intercept_call(
        &self,
        _call: &ParsedCommandCall,
        _sender: &dyn CommandSender,
    ) -> InterceptResult {
        InterceptResult::Continue
    }

    fn intercept_resolved_call(
        &self,
        _call: &ResolvedCommandCall,
        _sender: &dyn CommandSender,
    ) -> InterceptResult {
        InterceptResult::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CommandExecuteStatus {
    Successful,
    UnresolvedCommand,
    PermissionDenied,
    UnmatchedSignature,
    IllegalArgument,
    Intercepted,
    ExecutionFailed,
}

/// Outcome of one command execution.
#[derive(Debug)]
pub enum CommandExecuteResult {
    Success {
        call: Arc<ResolvedCommandCall>,
    },
    /// No command matched, or the message did not start with a name.
    UnresolvedCommand {
        call: Option<ParsedCommandCall>,
    },
    PermissionDenied {
        call: ParsedCommandCall,
    },
    UnmatchedSignature {
        call: ParsedCommandCall,
        failures: Vec<UnmatchedSignature>,
    },
    IllegalArgument {
        call: ParsedCommandCall,
        message: String,
    },
    Intercepted {
        call: Option<ParsedCommandCall>,
        reason: String,
    },
    ExecutionFailed {
        call: Arc<ResolvedCommandCall>,
        error: HandlerError,
    },
}

impl CommandExecuteResult {
    pub fn status(&self) -> CommandExecuteStatus {
        match self {
            CommandExecuteResult::Success { .. } => CommandExecuteStatus::Successful,
            CommandExecuteResult::UnresolvedCommand { .. } => CommandExecuteStatus::UnresolvedCommand,
            CommandExecuteResult::PermissionDenied { .. } => CommandExecuteStatus::PermissionDenied,
            CommandExecuteResult::UnmatchedSignature { .. } => {
                CommandExecuteStatus::UnmatchedSignature
            }
            CommandExecuteResult::IllegalArgument { .. } => CommandExecuteStatus::IllegalArgument,
            CommandExecuteResult::Intercepted { .. } => CommandExecuteStatus::Intercepted,
            CommandExecuteResult::ExecutionFailed { .. } => CommandExecuteStatus::ExecutionFailed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandExecuteResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// The matched command, if any.
    pub fn command(&self) -> Option<&Arc<Command>> {
        match self {
            CommandExecuteResult::Success { call }
            | CommandExecuteResult::ExecutionFailed { call, .. } => Some(call.command()),
            CommandExecuteResult::PermissionDenied { call }
            | CommandExecuteResult::UnmatchedSignature { call, .. }
            | CommandExecuteResult::IllegalArgument { call, .. } => call.command(),
            CommandExecuteResult::UnresolvedCommand { call }
            | CommandExecuteResult::Intercepted { call, .. } => {
                call.as_ref().and_then(ParsedCommandCall::command)
            }
        }
    }

    /// A line suitable for showing to the sender. `None` on success.
    pub fn describe(&self, prefix: &str) -> Option<String> {
        let text = match self {
            CommandExecuteResult::Success { .. } => return None,
            CommandExecuteResult::UnresolvedCommand { call } => match call {
                Some(call) => format!("Unknown command: {}", call.name()),
                None => "Unknown command".to_string(),
            },
            CommandExecuteResult::PermissionDenied { call } => {
                format!("Permission denied: {}", call.name())
            }
            CommandExecuteResult::UnmatchedSignature { call, failures } => {
                let mut lines = vec![format!("No overload of {} matches, usage:", call.name())];
                if let Some(command) = call.command() {
                    lines.push(command.usage(prefix));
                }
                for failure in failures {
                    lines.push(format!("  {}", failure));
                }
                lines.join("\n")
            }
            CommandExecuteResult::IllegalArgument { message, .. } => message.clone(),
            CommandExecuteResult::Intercepted { reason, .. } => {
                format!("Command intercepted: {}", reason)
            }
            CommandExecuteResult::ExecutionFailed { call, error } => {
                format!("{} failed: {}", call.command().primary_name(), error)
            }
        };
        Some(text)
    }
}

/// Runs commands from a registry against a permission service.
pub struct CommandExecutor {
    registry: Arc<CommandRegistry>,
    permissions: Arc<PermissionService>,
    interceptors: RwLock<Vec<Arc<dyn CommandCallInterceptor>>>,
}

impl CommandExecutor {
    pub fn new(registry: Arc<CommandRegistry>, permissions: Arc<PermissionService>) -> Self {
        Self {
            registry,
            permissions,
            interceptors: RwLock::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn permissions(&self) -> &Arc<PermissionService> {
        &self.permissions
    }

    pub fn add_interceptor(&self, interceptor: Arc<dyn CommandCallInterceptor>) {
        self.interceptors.write().push(interceptor);
    }

    /// Parse `message` as a command call and run it.
    pub async fn execute_command(
        &self,
        sender: Arc<dyn CommandSender>,
        message: impl Into<MessageChain>,
        check_permission: bool,
    ) -> CommandExecuteResult {
        let message = message.into();
        let call = match ParsedCommandCall::parse(&message, &self.registry) {
            Some(call) => call,
            None => return CommandExecuteResult::UnresolvedCommand { call: None },
        };
        if call.command().is_none() {
            tracing::debug!(name = %call.name(), "unresolved command");
            return CommandExecuteResult::UnresolvedCommand { call: Some(call) };
        }
        self.execute_call(sender, call, check_permission).await
    }

    /// Run `command` directly with `arguments`, skipping name lookup.
    pub async fn execute(
        &self,
        sender: Arc<dyn CommandSender>,
        command: &Arc<Command>,
        arguments: impl Into<MessageChain>,
        check_permission: bool,
    ) -> CommandExecuteResult {
        let tokens = tokenize(&arguments.into());
        let call = ParsedCommandCall::for_command(Arc::clone(command), tokens);
        self.execute_call(sender, call, check_permission).await
    }

    async fn execute_call(
        &self,
        sender: Arc<dyn CommandSender>,
        call: ParsedCommandCall,
        check_permission: bool,
    ) -> CommandExecuteResult {
        let command = match call.command() {
            Some(command) => Arc::clone(command),
            None => return CommandExecuteResult::UnresolvedCommand { call: Some(call) },
        };

        if let Some(reason) = self.first_rejection(|i| i.intercept_call(&call, sender.as_ref())) {
            return CommandExecuteResult::Intercepted {
                call: Some(call),
                reason,
            };
        }

        if check_permission
            && !self
                .permissions
                .has_permission(sender.permittee_id(), command.permission().id())
        {
            tracing::debug!(
                command = %command.primary_name(),
                sender = %sender.permittee_id(),
                "permission denied"
            );
            return CommandExecuteResult::PermissionDenied { call };
        }

        let resolved = match resolve(&call, &command, sender.as_ref()) {
            Ok(resolved) => Arc::new(resolved),
            Err(ResolveError::Unmatched(failures)) => {
                return CommandExecuteResult::UnmatchedSignature { call, failures };
            }
            Err(ResolveError::IllegalArgument(error)) => {
                return CommandExecuteResult::IllegalArgument {
                    call,
                    message: error.to_string(),
                };
            }
        };

        if let Some(reason) =
            self.first_rejection(|i| i.intercept_resolved_call(&resolved, sender.as_ref()))
        {
            return CommandExecuteResult::Intercepted {
                call: Some(call),
                reason,
            };
        }

        let handler = Arc::clone(resolved.signature().handler());
        let context = CommandContext::new(Arc::clone(&sender), Arc::clone(&resolved));
        let outcome = AssertUnwindSafe(handler(context)).catch_unwind().await;

        match outcome {
            Ok(Ok(())) => CommandExecuteResult::Success { call: resolved },
            Ok(Err(HandlerError::IllegalArgument(message))) => {
                CommandExecuteResult::IllegalArgument { call, message }
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    command = %command.primary_name(),
                    error = %error,
                    "command handler failed"
                );
                CommandExecuteResult::ExecutionFailed {
                    call: resolved,
                    error,
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(
                    command = %command.primary_name(),
                    panic = %message,
                    "command handler panicked"
                );
                CommandExecuteResult::ExecutionFailed {
                    call: resolved,
                    error: HandlerError::Panicked(message),
                }
            }
        }
    }

    fn first_rejection(
        &self,
        check: impl Fn(&dyn CommandCallInterceptor) -> InterceptResult,
    ) -> Option<String> {
        let interceptors = self.interceptors.read().clone();
        interceptors.iter().find_map(|i| match check(i.as_ref()) {
            InterceptResult::Continue => None,
            InterceptResult::Reject(reason) => Some(reason),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::argument::ParamType;
    use crate::command::definition::CommandOwner;
    use crate::command::sender::{CollectingSender, SenderKind};
    use crate::command::signature::CommandSignature;
    use crate::permission::PermitteeId;

    struct Fixture {
        executor: CommandExecutor,
        owner: CommandOwner,
        svc: Arc<PermissionService>,
    }

    fn fixture() -> Fixture {
        let svc = Arc::new(PermissionService::new());
        let owner = CommandOwner::new("test", &svc).unwrap();
        let registry = Arc::new(CommandRegistry::new("/"));
        Fixture {
            executor: CommandExecutor::new(registry, Arc::clone(&svc)),
            owner,
            svc,
        }
    }

    impl Fixture {
        fn register(&self, command: Command) -> Arc<Command> {
            let command = Arc::new(command);
            assert!(self.executor.registry().register_command(Arc::clone(&command), false));
            command
        }

        fn echo(&self) -> Arc<Command> {
            self.register(
                Command::simple(&self.owner, "echo")
                    .overload(
                        CommandSignature::builder()
                            .vararg("words", ParamType::String)
                            .handle(|ctx| async move {
                                let words = ctx.arg("words")?.to_string();
                                ctx.reply(words).await?;
                                Ok(())
                            })
                            .unwrap(),
                    )
                    .build(&self.svc)
                    .unwrap(),
            )
        }
    }

    fn user(id: u64) -> Arc<CollectingSender> {
        Arc::new(CollectingSender::new(SenderKind::Friend, PermitteeId::ExactFriend(id)))
    }

    #[tokio::test]
    async fn test_success_replies() {
        let fx = fixture();
        fx.echo();
        let console = Arc::new(CollectingSender::console());
        let result = fx
            .executor
            .execute_command(console.clone(), "/echo a b", true)
            .await;
        assert!(result.is_success(), "{:?}", result);
        assert_eq!(console.transcript(), "[a, b]");
    }

    #[tokio::test]
    async fn test_unresolved() {
        let fx = fixture();
        let console = Arc::new(CollectingSender::console());
        let result = fx.executor.execute_command(console.clone(), "/nope", true).await;
        assert_eq!(result.status(), CommandExecuteStatus::UnresolvedCommand);
        let result = fx.executor.execute_command(console, "", true).await;
        assert!(matches!(result, CommandExecuteResult::UnresolvedCommand { call: None }));
    }

    #[tokio::test]
    async fn test_permission_denied_unless_granted_or_skipped() {
        let fx = fixture();
        let echo = fx.echo();
        let sender = user(7);
        let result = fx.executor.execute_command(sender.clone(), "/echo hi", true).await;
        assert_eq!(result.status(), CommandExecuteStatus::PermissionDenied);
        assert!(sender.messages().is_empty());

        let result = fx.executor.execute_command(sender.clone(), "/echo hi", false).await;
        assert!(result.is_success());

        fx.svc.grant(PermitteeId::AnyFriend, echo.permission().id()).unwrap();
        let result = fx.executor.execute_command(sender, "/echo hi", true).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_handler_errors() {
        let fx = fixture();
        fx.register(
            Command::simple(&fx.owner, "fail")
                .overload(
                    CommandSignature::builder()
                        .param("mode", ParamType::String)
                        .handle(|ctx| async move {
                            match ctx.arg("mode")?.as_str() {
                                Some("illegal") => Err(HandlerError::illegal_argument("bad mode")),
                                Some("panic") => panic!("boom"),
                                _ => Err(HandlerError::failed("nope")),
                            }
                        })
                        .unwrap(),
                )
                .build(&fx.svc)
                .unwrap(),
        );
        let console = Arc::new(CollectingSender::console());

        let result = fx.executor.execute_command(console.clone(), "/fail illegal", true).await;
        assert!(matches!(
            &result,
            CommandExecuteResult::IllegalArgument { message, .. } if message == "bad mode"
        ));

        let result = fx.executor.execute_command(console.clone(), "/fail other", true).await;
        assert!(matches!(
            result,
            CommandExecuteResult::ExecutionFailed { error: HandlerError::Failed(_), .. }
        ));

        let result = fx.executor.execute_command(console, "/fail panic", true).await;
        assert!(matches!(
            &result,
            CommandExecuteResult::ExecutionFailed { error: HandlerError::Panicked(m), .. } if m == "boom"
        ));
    }

    struct Deny(&'static str, bool);

    impl CommandCallInterceptor for Deny {
        fn intercept_call(&self, call: &ParsedCommandCall, _: &dyn CommandSender) -> InterceptResult {
            if !self.1 && call.arguments().iter().any(|t| t.as_text() == Some(self.0)) {
                return InterceptResult::Reject(format!("{} is forbidden", self.0));
            }
            InterceptResult::Continue
        }

        fn intercept_resolved_call(
            &self,
            call: &ResolvedCommandCall,
            _: &dyn CommandSender,
        ) -> InterceptResult {
            let hit = call
                .arguments()
                .iter()
                .any(|(_, v)| v.to_string().contains(self.0));
            if self.1 && hit {
                return InterceptResult::Reject("resolved".into());
            }
            InterceptResult::Continue
        }
    }

    #[tokio::test]
    async fn test_interceptors() {
        let fx = fixture();
        fx.echo();
        fx.executor.add_interceptor(Arc::new(Deny("secret", false)));
        fx.executor.add_interceptor(Arc::new(Deny("hidden", true)));
        let console = Arc::new(CollectingSender::console());

        let result = fx.executor.execute_command(console.clone(), "/echo secret", true).await;
        assert!(matches!(
            &result,
            CommandExecuteResult::Intercepted { reason, .. } if reason == "secret is forbidden"
        ));
        let result = fx.executor.execute_command(console.clone(), "/echo hidden", true).await;
        assert!(matches!(
            &result,
            CommandExecuteResult::Intercepted { reason, .. } if reason == "resolved"
        ));
        assert!(console.messages().is_empty());
        assert!(fx.executor.execute_command(console, "/echo fine", true).await.is_success());
    }

    #[tokio::test]
    async fn test_direct_execute_and_describe() {
        let fx = fixture();
        let cmd = fx.register(
            Command::simple(&fx.owner, "add")
                .overload(
                    CommandSignature::builder()
                        .param("a", ParamType::Int)
                        .param("b", ParamType::Int)
                        .handle(|ctx| async move {
                            let sum = ctx.arg("a")?.as_int().unwrap_or(0)
                                + ctx.arg("b")?.as_int().unwrap_or(0);
                            ctx.reply(sum.to_string()).await?;
                            Ok(())
                        })
                        .unwrap(),
                )
                .build(&fx.svc)
                .unwrap(),
        );
        let console = Arc::new(CollectingSender::console());
        let result = fx.executor.execute(console.clone(), &cmd, "2 3", true).await;
        assert!(result.is_success());
        assert_eq!(console.transcript(), "5");
        assert!(result.describe("/").is_none());

        let result = fx.executor.execute(console, &cmd, "2", true).await;
        assert_eq!(result.status(), CommandExecuteStatus::UnmatchedSignature);
        let text = result.describe("/").unwrap();
        assert!(text.contains("/add <a> <b>"), "{}", text);
        assert_eq!(result.command().map(|c| c.primary_name()), Some("add"));
    }
}
