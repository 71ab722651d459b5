//! Parsed and resolved command calls.

use std::sync::Arc;

use super::argument::ArgValue;
use super::definition::Command;
use super::registry::CommandRegistry;
use super::signature::CommandSignature;
use super::tokenizer::{tokenize, Token};
use crate::message::MessageChain;

/// A tokenized invocation: the command name and its raw argument tokens.
#[derive(Debug, Clone)]
pub struct ParsedCommandCall {
    command: Option<Arc<Command>>,
    name: String,
    arguments: Vec<Token>,
}

impl ParsedCommandCall {
    /// Tokenize `message` and look the first token up in `registry`.
    ///
    /// Returns `None` when the message has no tokens or does not start with
    /// text. The call's command is `None` when no command matched the name.
    pub fn parse(message: &MessageChain, registry: &CommandRegistry) -> Option<Self> {
        let mut tokens = tokenize(message).into_iter();
        let name = match tokens.next()? {
            Token::Text(name) => name,
            Token::Element(_) => return None,
        };
        let command = registry.match_command(&name);
        Some(Self {
            command,
            name,
            arguments: tokens.collect(),
        })
    }

    /// A call for a known command, bypassing name lookup.
    pub fn for_command(command: Arc<Command>, arguments: Vec<Token>) -> Self {
        Self {
            name: command.primary_name().to_string(),
            command: Some(command),
            arguments,
        }
    }

    pub fn command(&self) -> Option<&Arc<Command>> {
        self.command.as_ref()
    }

    /// The name as typed, prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Token] {
        &self.arguments
    }
}

/// Values bound to an overload's value parameters, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<(String, ArgValue)>,
}

impl Arguments {
    pub(crate) fn push(&mut self, name: &str, value: ArgValue) {
        self.values.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn index(&self, i: usize) -> Option<&ArgValue> {
        self.values.get(i).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A call bound to exactly one overload. Only built on a successful match.
#[derive(Debug, Clone)]
pub struct ResolvedCommandCall {
    call: ParsedCommandCall,
    command: Arc<Command>,
    signature: Arc<CommandSignature>,
    arguments: Arguments,
}

impl ResolvedCommandCall {
    pub(crate) fn new(
        call: ParsedCommandCall,
        command: Arc<Command>,
        signature: Arc<CommandSignature>,
        arguments: Arguments,
    ) -> Self {
        Self {
            call,
            command,
            signature,
            arguments,
        }
    }

    pub fn original(&self) -> &ParsedCommandCall {
        &self.call
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    pub fn signature(&self) -> &Arc<CommandSignature> {
        &self.signature
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageElement;

    #[test]
    fn test_parse_splits_name_and_arguments() {
        let registry = CommandRegistry::new("/");
        let call = ParsedCommandCall::parse(&"/nope a \"b c\"".into(), &registry).unwrap();
        assert_eq!(call.name(), "/nope");
        assert!(call.command().is_none());
        assert_eq!(call.arguments(), &[Token::from("a"), Token::from("b c")]);
    }

    #[test]
    fn test_parse_rejects_empty_and_rich_first() {
        let registry = CommandRegistry::new("/");
        assert!(ParsedCommandCall::parse(&"   ".into(), &registry).is_none());
        let chain = MessageChain::new().with(MessageElement::Face { id: 1 }).with(" hi");
        assert!(ParsedCommandCall::parse(&chain, &registry).is_none());
    }

    #[test]
    fn test_arguments_lookup() {
        let mut args = Arguments::default();
        args.push("a", ArgValue::Int(1));
        args.push("b", ArgValue::String("x".into()));
        assert_eq!(args.get("b"), Some(&ArgValue::String("x".into())));
        assert_eq!(args.index(0), Some(&ArgValue::Int(1)));
        assert_eq!(args.len(), 2);
        assert!(args.get("c").is_none());
    }
}
