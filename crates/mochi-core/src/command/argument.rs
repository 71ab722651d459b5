//! Argument types, values and the parser context.
//!
//! A [`CommandArgumentContext`] maps a declared [`ParamType`] to the
//! [`ValueArgumentParser`] that turns a token into an [`ArgValue`]. Contexts are
//! immutable once built; a command's override context is layered over
//! [`CommandArgumentContext::builtins`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use thiserror::Error;

use super::parsers;
use super::sender::CommandSender;
use super::temporal::{MonthDay, YearMonth};
use crate::message::{MessageChain, MessageElement};
use crate::permission::{Permission, PermissionId, PermitteeId};

/// A parser rejected a value. The message is meant for the invoking user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentParseError {
    #[error("{0}")]
    Illegal(String),
    #[error("cannot parse {0}")]
    CannotParse(String),
    #[error("no such element: {0}")]
    NoSuchElement(String),
}

// ============================================================================
// Declared types
// ============================================================================

/// A closed set of constants, matched by name.
#[derive(Debug, Clone)]
pub struct EnumType {
    name: Arc<str>,
    constants: Arc<[String]>,
}

impl EnumType {
    pub fn new<I, S>(name: &str, constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: Arc::from(name),
            constants: constants.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a `strum::VariantNames` enum.
    pub fn of<E: strum::VariantNames>(name: &str) -> Self {
        Self::new(name, E::VARIANTS.iter().copied())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constants(&self) -> &[String] {
        &self.constants
    }
}

impl PartialEq for EnumType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.constants == other.constants
    }
}

impl Eq for EnumType {}

/// The declared type of a value parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Long,
    Short,
    Byte,
    Double,
    Float,
    Boolean,
    Char,
    String,
    /// The raw message: one element, or every remaining token when vararg.
    Message,
    Element,
    PermissionId,
    PermitteeId,
    Permission,
    Instant,
    LocalDate,
    LocalTime,
    LocalDateTime,
    OffsetDateTime,
    ZoneOffset,
    Year,
    YearMonth,
    MonthDay,
    Enum(EnumType),
    /// A type only known to an override context.
    Custom(&'static str),
}

impl ParamType {
    /// Name used for display and as the context lookup key.
    pub fn name(&self) -> &str {
        match self {
            ParamType::Int => "Int",
            ParamType::Long => "Long",
            ParamType::Short => "Short",
            ParamType::Byte => "Byte",
            ParamType::Double => "Double",
            ParamType::Float => "Float",
            ParamType::Boolean => "Boolean",
            ParamType::Char => "Char",
            ParamType::String => "String",
            ParamType::Message => "MessageChain",
            ParamType::Element => "Message",
            ParamType::PermissionId => "PermissionId",
            ParamType::PermitteeId => "PermitteeId",
            ParamType::Permission => "Permission",
            ParamType::Instant => "Instant",
            ParamType::LocalDate => "LocalDate",
            ParamType::LocalTime => "LocalTime",
            ParamType::LocalDateTime => "LocalDateTime",
            ParamType::OffsetDateTime => "OffsetDateTime",
            ParamType::ZoneOffset => "ZoneOffset",
            ParamType::Year => "Year",
            ParamType::YearMonth => "YearMonth",
            ParamType::MonthDay => "MonthDay",
            ParamType::Enum(e) => e.name(),
            ParamType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Values
// ============================================================================

/// A matched enum constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub type_name: String,
    pub constant: String,
    pub ordinal: usize,
}

impl EnumValue {
    /// Convert back into a `FromStr` enum (e.g. one deriving `strum::EnumString`).
    pub fn to<E: std::str::FromStr>(&self) -> Option<E> {
        self.constant.parse().ok()
    }
}

/// A parsed argument.
#[derive(Clone)]
pub enum ArgValue {
    Null,
    Int(i32),
    Long(i64),
    Short(i16),
    Byte(i8),
    Double(f64),
    Float(f32),
    Boolean(bool),
    Char(char),
    String(String),
    Message(MessageChain),
    Element(MessageElement),
    PermissionId(PermissionId),
    PermitteeId(PermitteeId),
    Permission(Permission),
    Instant(DateTime<Utc>),
    LocalDate(NaiveDate),
    LocalTime(NaiveTime),
    LocalDateTime(NaiveDateTime),
    OffsetDateTime(DateTime<FixedOffset>),
    ZoneOffset(FixedOffset),
    Year(i32),
    YearMonth(YearMonth),
    MonthDay(MonthDay),
    Enum(EnumValue),
    Custom(Arc<dyn Any + Send + Sync>),
    Vararg(Vec<ArgValue>),
}

impl ArgValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ArgValue::Null)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            ArgValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            ArgValue::Enum(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_permittee(&self) -> Option<PermitteeId> {
        match self {
            ArgValue::PermitteeId(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_permission(&self) -> Option<&Permission> {
        match self {
            ArgValue::Permission(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageChain> {
        match self {
            ArgValue::Message(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vararg(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::Vararg(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_custom<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            ArgValue::Custom(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Custom(_) => f.write_str("Custom(..)"),
            ArgValue::Vararg(items) => f.debug_list().entries(items).finish(),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => f.write_str("null"),
            ArgValue::Int(v) => write!(f, "{}", v),
            ArgValue::Long(v) => write!(f, "{}", v),
            ArgValue::Short(v) => write!(f, "{}", v),
            ArgValue::Byte(v) => write!(f, "{}", v),
            ArgValue::Double(v) => write!(f, "{}", v),
            ArgValue::Float(v) => write!(f, "{}", v),
            ArgValue::Boolean(v) => write!(f, "{}", v),
            ArgValue::Char(v) => write!(f, "{}", v),
            ArgValue::String(v) => f.write_str(v),
            ArgValue::Message(v) => write!(f, "{}", v),
            ArgValue::Element(v) => write!(f, "{}", v),
            ArgValue::PermissionId(v) => write!(f, "{}", v),
            ArgValue::PermitteeId(v) => write!(f, "{}", v),
            ArgValue::Permission(v) => write!(f, "{}", v.id()),
            ArgValue::Instant(v) => f.write_str(&super::temporal::format_instant(v)),
            ArgValue::LocalDate(v) => write!(f, "{}", v),
            ArgValue::LocalTime(v) => write!(f, "{}", v),
            ArgValue::LocalDateTime(v) => f.write_str(&super::temporal::format_local_date_time(v)),
            ArgValue::OffsetDateTime(v) => {
                f.write_str(&super::temporal::format_offset_date_time(v))
            }
            ArgValue::ZoneOffset(v) => write!(f, "{}", v),
            ArgValue::Year(v) => write!(f, "{}", v),
            ArgValue::YearMonth(v) => write!(f, "{}", v),
            ArgValue::MonthDay(v) => write!(f, "{}", v),
            ArgValue::Enum(v) => f.write_str(&v.constant),
            ArgValue::Custom(_) => f.write_str("<custom>"),
            ArgValue::Vararg(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        use ArgValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Message(a), Message(b)) => a == b,
            (Element(a), Element(b)) => a == b,
            (PermissionId(a), PermissionId(b)) => a == b,
            (PermitteeId(a), PermitteeId(b)) => a == b,
            (Permission(a), Permission(b)) => a == b,
            (Instant(a), Instant(b)) => a == b,
            (LocalDate(a), LocalDate(b)) => a == b,
            (LocalTime(a), LocalTime(b)) => a == b,
            (LocalDateTime(a), LocalDateTime(b)) => a == b,
            (OffsetDateTime(a), OffsetDateTime(b)) => a == b && a.offset() == b.offset(),
            (ZoneOffset(a), ZoneOffset(b)) => a == b,
            (Year(a), Year(b)) => a == b,
            (YearMonth(a), YearMonth(b)) => a == b,
            (MonthDay(a), MonthDay(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (Custom(a), Custom(b)) => Arc::ptr_eq(a, b),
            (Vararg(a), Vararg(b)) => a == b,
            _ => false,
        }
    }
}

// ============================================================================
// Parsers
// ============================================================================

/// Converts a token into a typed value.
pub trait ValueArgumentParser: Send + Sync {
    fn parse_text(
        &self,
        raw: &str,
        sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError>;

    /// Parse a rich element. Falls back to the element's text, if it has one.
    fn parse_element(
        &self,
        element: &MessageElement,
        sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        match element.text_fallback() {
            Some(text) => self.parse_text(&text, sender),
            None => Err(ArgumentParseError::CannotParse(element.content())),
        }
    }
}

/// Adapts a closure into a text-only [`ValueArgumentParser`].
pub struct FnParser<F>(pub F);

impl<F> ValueArgumentParser for FnParser<F>
where
    F: Fn(&str, &dyn CommandSender) -> Result<ArgValue, ArgumentParseError> + Send + Sync,
{
    fn parse_text(
        &self,
        raw: &str,
        sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        (self.0)(raw, sender)
    }
}

/// Immutable mapping from declared type to parser.
#[derive(Clone, Default)]
pub struct CommandArgumentContext {
    parsers: HashMap<String, Arc<dyn ValueArgumentParser>>,
}

impl fmt::Debug for CommandArgumentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.parsers.keys().collect();
        keys.sort();
        f.debug_struct("CommandArgumentContext")
            .field("types", &keys)
            .finish()
    }
}

impl CommandArgumentContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parsers for every built-in [`ParamType`] except `Permission` (which
    /// needs a service, see [`with_permissions`](Self::with_permissions)) and
    /// enums (handled per type).
    pub fn builtins() -> Self {
        parsers::builtin_context()
    }

    /// Builder-style insert. Replaces any parser already bound to `ty`.
    pub fn with(mut self, ty: &ParamType, parser: Arc<dyn ValueArgumentParser>) -> Self {
        self.parsers.insert(ty.name().to_string(), parser);
        self
    }

    /// Adds the `Permission` parser backed by `service`.
    pub fn with_permissions(self, service: Arc<crate::permission::PermissionService>) -> Self {
        self.with(
            &ParamType::Permission,
            Arc::new(parsers::PermissionParser::new(service)),
        )
    }

    /// Layer `overrides` on top of `self`; overrides win.
    pub fn merge(&self, overrides: &CommandArgumentContext) -> Self {
        let mut parsers = self.parsers.clone();
        for (key, parser) in &overrides.parsers {
            parsers.insert(key.clone(), Arc::clone(parser));
        }
        Self { parsers }
    }

    pub fn contains(&self, ty: &ParamType) -> bool {
        self.parsers.contains_key(ty.name())
    }

    /// Parser for `ty`. Enums without an explicit entry get a name matcher.
    pub fn parser_for(&self, ty: &ParamType) -> Option<Arc<dyn ValueArgumentParser>> {
        if let Some(parser) = self.parsers.get(ty.name()) {
            return Some(Arc::clone(parser));
        }
        match ty {
            ParamType::Enum(e) => Some(Arc::new(parsers::EnumParser::new(e.clone()))),
            _ => None,
        }
    }
}
