//! Command definitions and owners.
//!
//! A [`Command`] is built once through [`CommandBuilder`] and never changes.
//! Building registers the command's permission, `{namespace}:command.{name}`,
//! under its owner's parent permission.

use std::fmt;
use std::sync::Arc;

use strum::AsRefStr;

use super::argument::{CommandArgumentContext, ParamType};
use super::context::CommandContext;
use super::context::HandlerError;
use super::signature::{
    check_command_name, check_sub_command_name, CommandDeclarationError, CommandParameter,
    CommandSignature,
};
use crate::permission::{Permission, PermissionId, PermissionService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CommandKind {
    /// One handler receiving the remaining tokens as a message chain.
    Raw,
    /// Overloads without sub-command names.
    Simple,
    /// Overloads selected by leading sub-command names.
    Composite,
}

/// Whoever registers commands: a namespace and the permission its command
/// permissions hang under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandOwner {
    namespace: String,
    parent_permission: PermissionId,
}

impl CommandOwner {
    /// Owner for `namespace`, registering `{namespace}:*` under the root if
    /// it is not registered yet.
    pub fn new(
        namespace: &str,
        permissions: &PermissionService,
    ) -> Result<Self, CommandDeclarationError> {
        let parent = PermissionId::for_plugin(namespace, "*")?;
        permissions.register_or_get(
            parent.clone(),
            format!("The base permission of {}", namespace),
            &PermissionId::root(),
        )?;
        Ok(Self {
            namespace: parent.namespace().to_string(),
            parent_permission: parent,
        })
    }

    /// The built-in console owner.
    pub fn console(permissions: &PermissionService) -> Result<Self, CommandDeclarationError> {
        Self::new("console", permissions)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn parent_permission(&self) -> &PermissionId {
        &self.parent_permission
    }

    /// Allocate `{namespace}:{name}`.
    pub fn permission_id(&self, name: &str) -> Result<PermissionId, CommandDeclarationError> {
        Ok(PermissionId::for_plugin(&self.namespace, name)?)
    }
}

/// A registered-or-registrable command.
pub struct Command {
    owner: CommandOwner,
    primary_name: String,
    secondary_names: Vec<String>,
    description: String,
    usage: Option<String>,
    permission: Permission,
    prefix_optional: bool,
    kind: CommandKind,
    overloads: Vec<Arc<CommandSignature>>,
    context: CommandArgumentContext,
}

impl Command {
    pub fn raw(owner: &CommandOwner, name: &str) -> CommandBuilder {
        CommandBuilder::new(owner, name, CommandKind::Raw)
    }

    pub fn simple(owner: &CommandOwner, name: &str) -> CommandBuilder {
        CommandBuilder::new(owner, name, CommandKind::Simple)
    }

    pub fn composite(owner: &CommandOwner, name: &str) -> CommandBuilder {
        CommandBuilder::new(owner, name, CommandKind::Composite)
    }

    pub fn owner(&self) -> &CommandOwner {
        &self.owner
    }

    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    pub fn secondary_names(&self) -> &[String] {
        &self.secondary_names
    }

    /// Primary name followed by the secondary names.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_name.as_str())
            .chain(self.secondary_names.iter().map(String::as_str))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    pub fn prefix_optional(&self) -> bool {
        self.prefix_optional
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn overloads(&self) -> &[Arc<CommandSignature>] {
        &self.overloads
    }

    /// Built-in parsers merged with this command's overrides.
    pub fn argument_context(&self) -> &CommandArgumentContext {
        &self.context
    }

    /// Explicit usage text, or one generated line per overload.
    pub fn usage(&self, prefix: &str) -> String {
        if let Some(usage) = &self.usage {
            return usage.clone();
        }
        self.overloads
            .iter()
            .map(|sig| sig.usage_line(prefix, &self.primary_name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("owner", &self.owner.namespace)
            .field("primary_name", &self.primary_name)
            .field("secondary_names", &self.secondary_names)
            .field("kind", &self.kind)
            .field("permission", self.permission.id())
            .field("overloads", &self.overloads.len())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct CommandBuilder {
    owner: CommandOwner,
    kind: CommandKind,
    primary_name: String,
    secondary_names: Vec<String>,
    description: String,
    usage: Option<String>,
    permission: Option<PermissionId>,
    prefix_optional: bool,
    overrides: CommandArgumentContext,
    overloads: Vec<CommandSignature>,
}

impl CommandBuilder {
    fn new(owner: &CommandOwner, name: &str, kind: CommandKind) -> Self {
        Self {
            owner: owner.clone(),
            kind,
            primary_name: name.to_string(),
            secondary_names: Vec::new(),
            description: "<no description available>".to_string(),
            usage: None,
            permission: None,
            prefix_optional: false,
            overrides: CommandArgumentContext::empty(),
            overloads: Vec::new(),
        }
    }

    pub fn secondary_names(mut self, names: &[&str]) -> Self {
        self.secondary_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace the generated usage text.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Use an existing permission instead of allocating one.
    pub fn permission(mut self, id: PermissionId) -> Self {
        self.permission = Some(id);
        self
    }

    /// Allow invoking the command without the configured prefix.
    pub fn prefix_optional(mut self, prefix_optional: bool) -> Self {
        self.prefix_optional = prefix_optional;
        self
    }

    /// Parsers that shadow the built-in ones for this command.
    pub fn context(mut self, overrides: CommandArgumentContext) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn overload(mut self, signature: CommandSignature) -> Self {
        self.overloads.push(signature);
        self
    }

    /// Add an overload reached through the sub-command `names`.
    pub fn sub_command(self, names: &[&str], signature: CommandSignature) -> Self {
        self.group(&[names], signature)
    }

    /// Add an overload reached through nested sub-command names, outermost
    /// first, e.g. `&[&["group"], &["mute", "m"]]`.
    pub fn group(mut self, path: &[&[&str]], signature: CommandSignature) -> Self {
        let literals = path
            .iter()
            .map(|names| names.iter().map(|n| n.to_string()).collect())
            .collect();
        self.overloads.push(signature.with_leading_literals(literals));
        self
    }

    /// The single handler of a raw command; it receives every token as the
    /// `args` message chain.
    pub fn handle_raw<F, Fut>(self, f: F) -> Result<Self, CommandDeclarationError>
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let signature = CommandSignature::builder()
            .vararg("args", ParamType::Message)
            .handle(f)?;
        Ok(self.overload(signature))
    }

    pub fn build(self, permissions: &Arc<PermissionService>) -> Result<Command, CommandDeclarationError> {
        check_command_name(&self.primary_name)?;
        for name in &self.secondary_names {
            check_command_name(name)?;
        }
        if self.overloads.is_empty() {
            return Err(CommandDeclarationError::NoOverloads(self.primary_name));
        }
        if self.kind == CommandKind::Composite {
            for overload in &self.overloads {
                if !overload.has_sub_command() {
                    return Err(CommandDeclarationError::MissingSubCommand(self.primary_name));
                }
                for param in overload.parameters() {
                    if let CommandParameter::Literal(names) = param {
                        for name in names {
                            check_sub_command_name(name)?;
                        }
                    }
                }
            }
        }

        let context = CommandArgumentContext::builtins()
            .with_permissions(Arc::clone(permissions))
            .merge(&self.overrides);
        for overload in &self.overloads {
            for param in overload.value_parameters() {
                if context.parser_for(&param.ty).is_none() {
                    return Err(CommandDeclarationError::NoParser(param.ty.to_string()));
                }
            }
        }

        let permission = match self.permission {
            Some(id) => permissions.get_or_fail(&id)?,
            None => {
                let id = self
                    .owner
                    .permission_id(&format!("command.{}", self.primary_name))?;
                permissions.register_or_get(
                    id,
                    format!("Permission for command {}", self.primary_name),
                    self.owner.parent_permission(),
                )?
            }
        };

        tracing::debug!(
            command = %self.primary_name,
            owner = %self.owner.namespace,
            kind = self.kind.as_ref(),
            overloads = self.overloads.len(),
            "built command"
        );

        Ok(Command {
            owner: self.owner,
            primary_name: self.primary_name,
            secondary_names: self.secondary_names,
            description: self.description,
            usage: self.usage,
            permission,
            prefix_optional: self.prefix_optional,
            kind: self.kind,
            overloads: self.overloads.into_iter().map(Arc::new).collect(),
            context,
        })
    }
}
