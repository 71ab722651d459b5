//! Overload signatures and their builder.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use super::argument::{ArgValue, ParamType};
use super::context::{CommandContext, HandlerError};
use super::sender::ReceiverKind;
use super::BoxFuture;
use crate::permission::{PermissionError, PermissionIdError};

/// Characters that may not appear in a sub-command name.
pub const ILLEGAL_SUB_NAME_CHARS: &str = "\\/!@#$%^&*()_+-={}[];':\",.<>?`~";

/// Async body of an overload.
pub type CommandHandler =
    Arc<dyn Fn(CommandContext) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Wrap an async closure as a [`CommandHandler`].
pub fn handler<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// A command or overload was declared wrongly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandDeclarationError {
    #[error("'{name}' is not a valid name: {reason}")]
    IllegalName { name: String, reason: &'static str },
    #[error("the receiver must be declared before any parameter")]
    ReceiverNotFirst,
    #[error("sub-command names must precede value parameters (at '{0}')")]
    LiteralAfterValue(String),
    #[error("vararg parameter '{0}' must be the last parameter")]
    VarargNotLast(String),
    #[error("vararg parameter '{0}' cannot have a default value")]
    VarargWithDefault(String),
    #[error("required parameter '{0}' follows an optional parameter")]
    RequiredAfterOptional(String),
    #[error("duplicate parameter name '{0}'")]
    DuplicateParameter(String),
    #[error("no parser for parameter type {0}")]
    NoParser(String),
    #[error("command '{0}' declares no overloads")]
    NoOverloads(String),
    #[error("overload of composite command '{0}' has no sub-command name")]
    MissingSubCommand(String),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    PermissionId(#[from] PermissionIdError),
}

/// Check a command name: non-blank, no whitespace, no `:` or `.`.
pub fn check_command_name(name: &str) -> Result<(), CommandDeclarationError> {
    let reason = if name.trim().is_empty() {
        "name is blank"
    } else if name.chars().any(char::is_whitespace) {
        "whitespace is not allowed"
    } else if name.contains(':') {
        "':' is not allowed"
    } else if name.contains('.') {
        "'.' is not allowed"
    } else {
        return Ok(());
    };
    Err(CommandDeclarationError::IllegalName {
        name: name.to_string(),
        reason,
    })
}

pub fn check_sub_command_name(name: &str) -> Result<(), CommandDeclarationError> {
    let reason = if name.trim().is_empty() {
        "name is blank"
    } else if name.chars().any(char::is_whitespace) {
        "whitespace is not allowed"
    } else if name.chars().any(|c| ILLEGAL_SUB_NAME_CHARS.contains(c)) {
        "punctuation is not allowed in sub-command names"
    } else {
        return Ok(());
    };
    Err(CommandDeclarationError::IllegalName {
        name: name.to_string(),
        reason,
    })
}

// ============================================================================
// Parameters
// ============================================================================

/// A typed, named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueParameter {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<ArgValue>,
    pub vararg: bool,
}

impl ValueParameter {
    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandParameter {
    /// Sub-command name; any alias matches case-insensitively.
    Literal(Vec<String>),
    Value(ValueParameter),
}

impl CommandParameter {
    pub fn accepts_literal(&self, token: &str) -> bool {
        match self {
            CommandParameter::Literal(names) => names.iter().any(|n| n.eq_ignore_ascii_case(token)),
            CommandParameter::Value(_) => false,
        }
    }

    fn usage(&self) -> String {
        match self {
            CommandParameter::Literal(names) => names.first().cloned().unwrap_or_default(),
            CommandParameter::Value(p) if p.vararg => format!("<{}>...", p.name),
            CommandParameter::Value(p) if p.is_optional() => format!("[{}]", p.name),
            CommandParameter::Value(p) => format!("<{}>", p.name),
        }
    }
}

impl fmt::Display for CommandParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandParameter::Literal(names) => write!(f, "<{}>", names.join("|")),
            CommandParameter::Value(p) => {
                if p.vararg {
                    f.write_str("vararg ")?;
                }
                write!(f, "{}: {}", p.name, p.ty)?;
                match &p.default {
                    Some(ArgValue::Null) => f.write_str("? = ..."),
                    Some(_) => f.write_str(" = ..."),
                    None => Ok(()),
                }
            }
        }
    }
}

// ============================================================================
// Signature
// ============================================================================

/// One overload of a command. Immutable once built.
pub struct CommandSignature {
    receiver: Option<ReceiverKind>,
    parameters: Vec<CommandParameter>,
    description: Option<String>,
    handler: CommandHandler,
}

impl CommandSignature {
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    pub fn receiver(&self) -> Option<ReceiverKind> {
        self.receiver
    }

    pub fn parameters(&self) -> &[CommandParameter] {
        &self.parameters
    }

    pub fn value_parameters(&self) -> impl Iterator<Item = &ValueParameter> {
        self.parameters.iter().filter_map(|p| match p {
            CommandParameter::Value(v) => Some(v),
            CommandParameter::Literal(_) => None,
        })
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn handler(&self) -> &CommandHandler {
        &self.handler
    }

    /// True if the first parameter is a sub-command name.
    pub fn has_sub_command(&self) -> bool {
        matches!(self.parameters.first(), Some(CommandParameter::Literal(_)))
    }

    /// Prefix the parameters with sub-command names.
    pub(crate) fn with_leading_literals(mut self, literals: Vec<Vec<String>>) -> Self {
        let mut parameters: Vec<CommandParameter> =
            literals.into_iter().map(CommandParameter::Literal).collect();
        parameters.append(&mut self.parameters);
        self.parameters = parameters;
        self
    }

    /// `/name sub <a> [b]    # description`
    pub fn usage_line(&self, prefix: &str, command_name: &str) -> String {
        let mut line = format!("{}{}", prefix, command_name);
        for param in &self.parameters {
            line.push(' ');
            line.push_str(&param.usage());
        }
        if let Some(description) = &self.description {
            line.push_str("    # ");
            line.push_str(description);
        }
        line
    }
}

impl fmt::Display for CommandSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
        write!(f, "CommandSignature({})", params.join(", "))
    }
}

impl fmt::Debug for CommandSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSignature")
            .field("receiver", &self.receiver)
            .field("parameters", &self.parameters)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Declares one overload. Declaration errors are collected and reported when
/// the handler is attached.
#[derive(Default)]
pub struct SignatureBuilder {
    receiver: Option<ReceiverKind>,
    parameters: Vec<CommandParameter>,
    description: Option<String>,
    error: Option<CommandDeclarationError>,
}

impl SignatureBuilder {
    fn fail(mut self, error: CommandDeclarationError) -> Self {
        self.error.get_or_insert(error);
        self
    }

    /// Restrict which senders may use this overload.
    pub fn receiver(mut self, kind: ReceiverKind) -> Self {
        if !self.parameters.is_empty() {
            return self.fail(CommandDeclarationError::ReceiverNotFirst);
        }
        self.receiver = Some(kind);
        self
    }

    /// A sub-command name with aliases.
    pub fn literal(mut self, names: &[&str]) -> Self {
        if let Some(CommandParameter::Value(v)) = self.parameters.last() {
            let name = v.name.clone();
            return self.fail(CommandDeclarationError::LiteralAfterValue(name));
        }
        for name in names {
            if let Err(e) = check_sub_command_name(name) {
                return self.fail(e);
            }
        }
        self.parameters.push(CommandParameter::Literal(
            names.iter().map(|n| n.to_string()).collect(),
        ));
        self
    }

    fn value(mut self, name: &str, ty: ParamType, default: Option<ArgValue>, vararg: bool) -> Self {
        self.parameters.push(CommandParameter::Value(ValueParameter {
            name: name.to_string(),
            ty,
            default,
            vararg,
        }));
        self
    }

    pub fn param(self, name: &str, ty: ParamType) -> Self {
        self.value(name, ty, None, false)
    }

    /// A parameter that takes `default` when no argument is left for it.
    pub fn optional(self, name: &str, ty: ParamType, default: ArgValue) -> Self {
        self.value(name, ty, Some(default), false)
    }

    /// An optional parameter defaulting to [`ArgValue::Null`].
    pub fn nullable(self, name: &str, ty: ParamType) -> Self {
        self.value(name, ty, Some(ArgValue::Null), false)
    }

    /// Collects every remaining argument, possibly none.
    pub fn vararg(self, name: &str, ty: ParamType) -> Self {
        self.value(name, ty, None, true)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn handle<F, Fut>(self, f: F) -> Result<CommandSignature, CommandDeclarationError>
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handler(handler(f))
    }

    pub fn handler(self, handler: CommandHandler) -> Result<CommandSignature, CommandDeclarationError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        validate(&self.parameters)?;
        Ok(CommandSignature {
            receiver: self.receiver,
            parameters: self.parameters,
            description: self.description,
            handler,
        })
    }
}

fn validate(parameters: &[CommandParameter]) -> Result<(), CommandDeclarationError> {
    let values: Vec<&ValueParameter> = parameters
        .iter()
        .filter_map(|p| match p {
            CommandParameter::Value(v) => Some(v),
            CommandParameter::Literal(_) => None,
        })
        .collect();

    let mut seen_optional = false;
    for (i, param) in values.iter().enumerate() {
        if values[..i].iter().any(|p| p.name == param.name) {
            return Err(CommandDeclarationError::DuplicateParameter(param.name.clone()));
        }
        if param.vararg {
            if param.default.is_some() {
                return Err(CommandDeclarationError::VarargWithDefault(param.name.clone()));
            }
            if i + 1 != values.len() {
                return Err(CommandDeclarationError::VarargNotLast(param.name.clone()));
            }
            continue;
        }
        if param.is_optional() {
            seen_optional = true;
        } else if seen_optional {
            return Err(CommandDeclarationError::RequiredAfterOptional(param.name.clone()));
        }
    }
    Ok(())
}
