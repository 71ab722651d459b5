//! Overload resolution.
//!
//! Every overload of the command is tried against the call. Each attempt
//! checks the receiver, matches sub-command names, checks the argument count,
//! then parses the arguments. One survivor wins; several survivors are ranked
//! by specificity (`parameters - defaulted * 1.001`, so consuming more
//! arguments wins and filling in defaults loses) and a tie is ambiguous.

use std::fmt;
use std::sync::Arc;

use super::argument::{ArgValue, ArgumentParseError, ParamType};
use super::call::{Arguments, ParsedCommandCall, ResolvedCommandCall};
use super::definition::Command;
use super::sender::{CommandSender, ReceiverKind, SenderKind};
use super::signature::{CommandParameter, CommandSignature, ValueParameter};
use super::tokenizer::Token;
use crate::message::{MessageChain, MessageElement};

const SCORE_EPSILON: f64 = 1e-9;

/// Why an overload did not match.
#[derive(Debug, Clone)]
pub enum FailureReason {
    InapplicableReceiverArgument {
        expected: ReceiverKind,
        actual: SenderKind,
    },
    InapplicableValueArgument {
        parameter: String,
        argument: String,
        message: String,
    },
    TooManyArguments {
        expected: usize,
        actual: usize,
    },
    NotEnoughArguments,
    ResolutionAmbiguity {
        candidates: Vec<Arc<CommandSignature>>,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InapplicableReceiverArgument { expected, actual } => write!(
                f,
                "a {} sender cannot use this, it requires {}",
                actual, expected
            ),
            FailureReason::InapplicableValueArgument {
                parameter,
                argument,
                message,
            } => write!(f, "'{}' does not fit {}: {}", argument, parameter, message),
            FailureReason::TooManyArguments { expected, actual } => write!(
                f,
                "too many arguments, expected at most {} but got {}",
                expected, actual
            ),
            FailureReason::NotEnoughArguments => f.write_str("not enough arguments"),
            FailureReason::ResolutionAmbiguity { candidates } => {
                write!(f, "ambiguous between {} overloads", candidates.len())
            }
        }
    }
}

/// An overload paired with the reason it failed.
#[derive(Debug, Clone)]
pub struct UnmatchedSignature {
    pub signature: Arc<CommandSignature>,
    pub reason: FailureReason,
}

impl fmt::Display for UnmatchedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.signature, self.reason)
    }
}

#[derive(Debug, Clone)]
pub enum ResolveError {
    Unmatched(Vec<UnmatchedSignature>),
    /// The only overload of the right shape rejected an argument value.
    IllegalArgument(ArgumentParseError),
}

enum Attempt {
    /// Wrong sender, sub-command or argument count.
    Shape(FailureReason),
    /// Right shape, but a value parser refused an argument.
    Value(FailureReason, ArgumentParseError),
}

struct Candidate {
    signature: Arc<CommandSignature>,
    arguments: Arguments,
    score: f64,
}

/// Bind `call` to one overload of `command`.
pub fn resolve(
    call: &ParsedCommandCall,
    command: &Arc<Command>,
    sender: &dyn CommandSender,
) -> Result<ResolvedCommandCall, ResolveError> {
    let mut survivors = Vec::new();
    let mut failures = Vec::new();
    let mut value_errors = Vec::new();

    for signature in command.overloads() {
        match attempt(signature, call.arguments(), command, sender) {
            Ok((arguments, score)) => survivors.push(Candidate {
                signature: Arc::clone(signature),
                arguments,
                score,
            }),
            Err(Attempt::Shape(reason)) => failures.push(UnmatchedSignature {
                signature: Arc::clone(signature),
                reason,
            }),
            Err(Attempt::Value(reason, error)) => {
                failures.push(UnmatchedSignature {
                    signature: Arc::clone(signature),
                    reason,
                });
                value_errors.push(error);
            }
        }
    }

    if survivors.is_empty() {
        tracing::debug!(
            command = %command.primary_name(),
            failures = failures.len(),
            "no overload matched"
        );
        if value_errors.len() == 1 {
            if let Some(error) = value_errors.pop() {
                return Err(ResolveError::IllegalArgument(error));
            }
        }
        return Err(ResolveError::Unmatched(failures));
    }

    let best = survivors
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut top: Vec<Candidate> = survivors
        .into_iter()
        .filter(|c| (best - c.score).abs() < SCORE_EPSILON)
        .collect();

    if top.len() == 1 {
        if let Some(winner) = top.pop() {
            return Ok(ResolvedCommandCall::new(
                call.clone(),
                Arc::clone(command),
                winner.signature,
                winner.arguments,
            ));
        }
    }

    let candidates: Vec<Arc<CommandSignature>> =
        top.iter().map(|c| Arc::clone(&c.signature)).collect();
    tracing::debug!(
        command = %command.primary_name(),
        candidates = candidates.len(),
        "ambiguous call"
    );
    Err(ResolveError::Unmatched(
        top.into_iter()
            .map(|c| UnmatchedSignature {
                signature: c.signature,
                reason: FailureReason::ResolutionAmbiguity {
                    candidates: candidates.clone(),
                },
            })
            .collect(),
    ))
}

fn attempt(
    signature: &CommandSignature,
    tokens: &[Token],
    command: &Command,
    sender: &dyn CommandSender,
) -> Result<(Arguments, f64), Attempt> {
    if let Some(expected) = signature.receiver() {
        if !expected.accepts(sender.kind()) {
            return Err(Attempt::Shape(FailureReason::InapplicableReceiverArgument {
                expected,
                actual: sender.kind(),
            }));
        }
    }

    let params = signature.parameters();

    for (param, token) in params.iter().zip(tokens) {
        if let CommandParameter::Literal(_) = param {
            let matched = token.as_text().is_some_and(|t| param.accepts_literal(t));
            if !matched {
                return Err(Attempt::Shape(FailureReason::InapplicableValueArgument {
                    parameter: param.to_string(),
                    argument: token.content(),
                    message: "unknown sub-command".to_string(),
                }));
            }
        }
    }

    let vararg = match params.last() {
        Some(CommandParameter::Value(v)) if v.vararg => Some(v),
        _ => None,
    };
    let fixed = params.len() - usize::from(vararg.is_some());
    if tokens.len() > fixed && vararg.is_none() {
        return Err(Attempt::Shape(FailureReason::TooManyArguments {
            expected: fixed,
            actual: tokens.len(),
        }));
    }
    let supplied = tokens.len().min(fixed);
    let missing_required = params[supplied..fixed].iter().any(|p| match p {
        CommandParameter::Literal(_) => true,
        CommandParameter::Value(v) => !v.is_optional(),
    });
    if missing_required {
        return Err(Attempt::Shape(FailureReason::NotEnoughArguments));
    }

    let mut arguments = Arguments::default();
    for (param, token) in params[..supplied].iter().zip(tokens) {
        if let CommandParameter::Value(v) = param {
            let value = parse_one(command, v, token, sender)?;
            arguments.push(&v.name, value);
        }
    }

    let mut defaulted = 0usize;
    for param in &params[supplied..fixed] {
        if let CommandParameter::Value(v) = param {
            if let Some(default) = &v.default {
                arguments.push(&v.name, default.clone());
                defaulted += 1;
            }
        }
    }

    if let Some(v) = vararg {
        let rest = &tokens[supplied..];
        let value = if v.ty == ParamType::Message {
            ArgValue::Message(
                rest.iter()
                    .map(|t| match t {
                        Token::Text(s) => MessageElement::Text(s.clone()),
                        Token::Element(e) => e.clone(),
                    })
                    .collect::<MessageChain>(),
            )
        } else {
            let mut values = Vec::with_capacity(rest.len());
            for token in rest {
                values.push(parse_one(command, v, token, sender)?);
            }
            ArgValue::Vararg(values)
        };
        arguments.push(&v.name, value);
    }

    let score = params.len() as f64 - defaulted as f64 * 1.001;
    Ok((arguments, score))
}

fn parse_one(
    command: &Command,
    param: &ValueParameter,
    token: &Token,
    sender: &dyn CommandSender,
) -> Result<ArgValue, Attempt> {
    let describe = |message: String| FailureReason::InapplicableValueArgument {
        parameter: param.name.clone(),
        argument: token.content(),
        message,
    };
    let parser = command
        .argument_context()
        .parser_for(&param.ty)
        .ok_or_else(|| Attempt::Shape(describe(format!("no parser for {}", param.ty))))?;
    let parsed = match token {
        Token::Text(raw) => parser.parse_text(raw, sender),
        Token::Element(element) => parser.parse_element(element, sender),
    };
    parsed.map_err(|e| Attempt::Value(describe(e.to_string()), e))
}
