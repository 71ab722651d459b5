//! Name → command lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::definition::{Command, CommandOwner};

#[derive(Default)]
struct Inner {
    /// Registered commands, in registration order.
    commands: Vec<Arc<Command>>,
    /// Lower-cased name → command.
    names: HashMap<String, Arc<Command>>,
}

/// Registry of commands, safe to share across tasks.
pub struct CommandRegistry {
    prefix: String,
    inner: RwLock<Inner>,
}

impl CommandRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// The prefix commands are invoked with, e.g. `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register `command` under all of its names.
    ///
    /// Without `override_existing`, any name clash fails the registration and
    /// nothing changes. With it, clashing names are rebound to `command`; a
    /// previous command that loses all of its names is dropped.
    pub fn register_command(&self, command: Arc<Command>, override_existing: bool) -> bool {
        let names: Vec<String> = command.all_names().map(str::to_lowercase).collect();
        let mut inner = self.inner.write();

        if inner.commands.iter().any(|c| Arc::ptr_eq(c, &command)) {
            return false;
        }
        let clashes: Vec<&String> = names.iter().filter(|n| inner.names.contains_key(*n)).collect();
        if !clashes.is_empty() && !override_existing {
            tracing::debug!(
                command = %command.primary_name(),
                clashes = ?clashes,
                "command name already taken"
            );
            return false;
        }

        for name in names {
            inner.names.insert(name, Arc::clone(&command));
        }
        inner.commands.push(Arc::clone(&command));

        let Inner { commands, names } = &mut *inner;
        commands.retain(|c| names.values().any(|bound| Arc::ptr_eq(bound, c)));

        tracing::debug!(
            command = %command.primary_name(),
            owner = %command.owner().namespace(),
            "registered command"
        );
        true
    }

    /// Remove `command` and every name bound to it. False if it was not
    /// registered.
    pub fn unregister_command(&self, command: &Arc<Command>) -> bool {
        let mut inner = self.inner.write();
        let before = inner.commands.len();
        inner.commands.retain(|c| !Arc::ptr_eq(c, command));
        if inner.commands.len() == before {
            return false;
        }
        inner.names.retain(|_, bound| !Arc::ptr_eq(bound, command));
        tracing::debug!(command = %command.primary_name(), "unregistered command");
        true
    }

    /// Remove every command of `owner`.
    pub fn unregister_all_commands(&self, owner: &CommandOwner) {
        let owned = self.commands_of(owner);
        for command in &owned {
            self.unregister_command(command);
        }
    }

    /// Find the command for a typed name.
    ///
    /// With the prefix, every command matches; without it, only commands
    /// marked prefix-optional do. Names compare case-insensitively.
    pub fn match_command(&self, typed: &str) -> Option<Arc<Command>> {
        let inner = self.inner.read();
        if !self.prefix.is_empty() {
            if let Some(name) = typed.strip_prefix(self.prefix.as_str()) {
                if let Some(command) = inner.names.get(&name.to_lowercase()) {
                    return Some(Arc::clone(command));
                }
            }
        }
        inner
            .names
            .get(&typed.to_lowercase())
            .filter(|c| self.prefix.is_empty() || c.prefix_optional())
            .cloned()
    }

    pub fn is_registered(&self, command: &Arc<Command>) -> bool {
        self.inner
            .read()
            .commands
            .iter()
            .any(|c| Arc::ptr_eq(c, command))
    }

    pub fn all_registered_commands(&self) -> Vec<Arc<Command>> {
        self.inner.read().commands.clone()
    }

    pub fn commands_of(&self, owner: &CommandOwner) -> Vec<Arc<Command>> {
        self.inner
            .read()
            .commands
            .iter()
            .filter(|c| c.owner() == owner)
            .cloned()
            .collect()
    }
}
