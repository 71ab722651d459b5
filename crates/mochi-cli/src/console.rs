//! The interactive console: a stdout command sender and the read loop.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mochi_core::command::{
    BoxFuture, CommandExecuteResult, CommandExecutor, CommandOwner, CommandRegistry,
    CommandSender, SenderKind, register_builtin_commands,
};
use mochi_core::config::Config;
use mochi_core::message::MessageChain;
use mochi_core::permission::{PermissionService, Permittee, PermitteeId};

/// The console user. Replies go to stdout, one line per message.
pub struct ConsoleSender;

impl Permittee for ConsoleSender {
    fn permittee_id(&self) -> PermitteeId {
        PermitteeId::Console
    }
}

impl CommandSender for ConsoleSender {
    fn kind(&self) -> SenderKind {
        SenderKind::Console
    }

    fn name(&self) -> String {
        "ConsoleCommandSender".to_string()
    }

    fn send_message<'a>(&'a self, message: MessageChain) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move { write_line(&message.content()) })
    }
}

fn write_line(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", text)?;
    out.flush()
}

/// Executor plus the stop flag the built-in `stop` command sets.
pub struct Console {
    executor: CommandExecutor,
    prefix: String,
    stop: Arc<AtomicBool>,
}

impl Console {
    /// Register the built-in commands under the configured owner and apply the
    /// configured grants.
    pub fn new(config: &Config) -> io::Result<Self> {
        let permissions = Arc::new(PermissionService::new());
        let registry = Arc::new(CommandRegistry::new(config.command_prefix.clone()));
        let owner = CommandOwner::new(&config.console.owner_namespace, &permissions)
            .map_err(io::Error::other)?;
        let stop = Arc::new(AtomicBool::new(false));
        register_builtin_commands(&registry, &permissions, &owner, Arc::clone(&stop))
            .map_err(io::Error::other)?;
        let granted = config.apply_grants(&permissions).map_err(io::Error::other)?;
        tracing::debug!(granted, "console ready");
        Ok(Self {
            executor: CommandExecutor::new(registry, permissions),
            prefix: config.command_prefix.clone(),
            stop,
        })
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run one line. The prefix is optional on the console.
    pub async fn run_line(&self, line: &str) -> CommandExecuteResult {
        let line = line.trim();
        let line = if line.starts_with(self.prefix.as_str()) {
            line.to_string()
        } else {
            format!("{}{}", self.prefix, line)
        };
        self.executor
            .execute_command(Arc::new(ConsoleSender), line, true)
            .await
    }

    /// Run one line and report a failure on stderr. Returns whether it succeeded.
    pub async fn run_and_report(&self, line: &str) -> bool {
        let result = self.run_line(line).await;
        match result.describe(&self.prefix) {
            None => true,
            Some(text) => {
                eprintln!("{}", text);
                false
            }
        }
    }

    /// Read lines until end of input or `stop`.
    pub async fn repl(&self, input: impl BufRead) -> io::Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            self.run_and_report(&line).await;
            if self.stopped() {
                break;
            }
        }
        Ok(())
    }
}
