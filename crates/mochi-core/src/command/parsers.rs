//! Built-in argument parsers.

use std::collections::HashMap;
use std::sync::Arc;

use super::argument::{
    ArgValue, ArgumentParseError, CommandArgumentContext, EnumType, EnumValue, ParamType,
    ValueArgumentParser,
};
use super::sender::CommandSender;
use super::temporal::TemporalParser;
use crate::message::{MessageChain, MessageElement};
use crate::permission::{PermissionId, PermissionService, PermitteeId};

/// Numeric parsers differ only in target type and wrapper variant.
macro_rules! number_parser {
    ($name:ident, $ty:ty, $variant:ident, $label:literal) => {
        pub struct $name;

        impl ValueArgumentParser for $name {
            fn parse_text(
                &self,
                raw: &str,
                _sender: &dyn CommandSender,
            ) -> Result<ArgValue, ArgumentParseError> {
                raw.trim().parse::<$ty>().map(ArgValue::$variant).map_err(|_| {
                    ArgumentParseError::Illegal(format!("cannot parse '{}' as {}", raw, $label))
                })
            }
        }
    };
}

number_parser!(IntParser, i32, Int, "Int");
number_parser!(LongParser, i64, Long, "Long");
number_parser!(ShortParser, i16, Short, "Short");
number_parser!(ByteParser, i8, Byte, "Byte");
number_parser!(DoubleParser, f64, Double, "Double");
number_parser!(FloatParser, f32, Float, "Float");

/// `true`, `yes`, `enabled`, `on` and `1` are true; anything else is false.
pub struct BooleanParser;

impl ValueArgumentParser for BooleanParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        let raw = raw.trim();
        let truthy = ["true", "yes", "enabled", "on", "1"]
            .iter()
            .any(|t| raw.eq_ignore_ascii_case(t));
        Ok(ArgValue::Boolean(truthy))
    }
}

pub struct CharParser;

impl ValueArgumentParser for CharParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(ArgValue::Char(c)),
            _ => Err(ArgumentParseError::Illegal(format!(
                "'{}' is not a single character",
                raw
            ))),
        }
    }
}

pub struct StringParser;

impl ValueArgumentParser for StringParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        Ok(ArgValue::String(raw.to_string()))
    }
}

/// Wraps the token as a one-element chain.
pub struct MessageChainParser;

impl ValueArgumentParser for MessageChainParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        Ok(ArgValue::Message(MessageChain::from(raw)))
    }

    fn parse_element(
        &self,
        element: &MessageElement,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        Ok(ArgValue::Message(MessageChain::from(vec![element.clone()])))
    }
}

pub struct ElementParser;

impl ValueArgumentParser for ElementParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        Ok(ArgValue::Element(MessageElement::text(raw)))
    }

    fn parse_element(
        &self,
        element: &MessageElement,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        Ok(ArgValue::Element(element.clone()))
    }
}

pub struct PermissionIdParser;

impl ValueArgumentParser for PermissionIdParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        raw.parse::<PermissionId>()
            .map(ArgValue::PermissionId)
            .map_err(|e| ArgumentParseError::Illegal(e.to_string()))
    }
}

/// Accepts permittee strings, `~` for the sender itself, a bare account
/// number (an exact user) or an `@` mention.
pub struct PermitteeIdParser;

impl ValueArgumentParser for PermitteeIdParser {
    fn parse_text(
        &self,
        raw: &str,
        sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        let raw = raw.trim();
        if raw == "~" {
            return Ok(ArgValue::PermitteeId(sender.permittee_id()));
        }
        if let Ok(id) = raw.parse::<u64>() {
            return Ok(ArgValue::PermitteeId(PermitteeId::ExactUser(id)));
        }
        raw.parse::<PermitteeId>()
            .map(ArgValue::PermitteeId)
            .map_err(|e| ArgumentParseError::Illegal(e.to_string()))
    }

    fn parse_element(
        &self,
        element: &MessageElement,
        sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        match element {
            MessageElement::At { target, .. } => {
                Ok(ArgValue::PermitteeId(PermitteeId::ExactUser(*target)))
            }
            MessageElement::Text(text) => self.parse_text(text, sender),
            other => Err(ArgumentParseError::CannotParse(other.content())),
        }
    }
}

/// Looks up a registered permission by id.
pub struct PermissionParser {
    service: Arc<PermissionService>,
}

impl PermissionParser {
    pub fn new(service: Arc<PermissionService>) -> Self {
        Self { service }
    }
}

impl ValueArgumentParser for PermissionParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        let id = raw
            .parse::<PermissionId>()
            .map_err(|e| ArgumentParseError::Illegal(e.to_string()))?;
        self.service
            .get_or_fail(&id)
            .map(ArgValue::Permission)
            .map_err(|e| ArgumentParseError::Illegal(e.to_string()))
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Matches enum constants by name.
///
/// When two constants differ only by case, only exact names match. Otherwise
/// a name matches exactly, by its camelCase form (`A_B` as `aB`, unless two
/// constants share a camelCase form) or case-insensitively.
pub struct EnumParser {
    ty: EnumType,
    exact_only: bool,
    camel: HashMap<String, usize>,
    lower: HashMap<String, usize>,
}

impl EnumParser {
    pub fn new(ty: EnumType) -> Self {
        let lower: HashMap<String, usize> = ty
            .constants()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.to_lowercase(), i))
            .collect();
        let exact_only = lower.len() < ty.constants().len();

        let mut camel: HashMap<String, usize> = ty
            .constants()
            .iter()
            .enumerate()
            .map(|(i, c)| (camel_case(c), i))
            .collect();
        if camel.len() < ty.constants().len() {
            camel.clear();
        }

        Self {
            ty,
            exact_only,
            camel,
            lower,
        }
    }

    fn find(&self, raw: &str) -> Option<usize> {
        let constants = self.ty.constants();
        if let Some(i) = constants.iter().position(|c| c == raw) {
            return Some(i);
        }
        if self.exact_only {
            return None;
        }
        self.camel
            .get(raw)
            .or_else(|| self.lower.get(&raw.to_lowercase()))
            .copied()
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('_').filter(|p| !p.is_empty()).enumerate() {
        let lower = part.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

impl ValueArgumentParser for EnumParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        let raw = raw.trim();
        match self.find(raw) {
            Some(ordinal) => Ok(ArgValue::Enum(EnumValue {
                type_name: self.ty.name().to_string(),
                constant: self.ty.constants()[ordinal].clone(),
                ordinal,
            })),
            None => Err(ArgumentParseError::Illegal(format!(
                "'{}' is not a {}, expected one of: {}",
                raw,
                self.ty.name(),
                self.ty.constants().join(", ")
            ))),
        }
    }
}

// ============================================================================
// Context
// ============================================================================

pub(super) fn builtin_context() -> CommandArgumentContext {
    let temporal = [
        ParamType::Instant,
        ParamType::LocalDate,
        ParamType::LocalTime,
        ParamType::LocalDateTime,
        ParamType::OffsetDateTime,
        ParamType::ZoneOffset,
        ParamType::Year,
        ParamType::YearMonth,
        ParamType::MonthDay,
    ];
    let mut ctx = CommandArgumentContext::empty()
        .with(&ParamType::Int, Arc::new(IntParser))
        .with(&ParamType::Long, Arc::new(LongParser))
        .with(&ParamType::Short, Arc::new(ShortParser))
        .with(&ParamType::Byte, Arc::new(ByteParser))
        .with(&ParamType::Double, Arc::new(DoubleParser))
        .with(&ParamType::Float, Arc::new(FloatParser))
        .with(&ParamType::Boolean, Arc::new(BooleanParser))
        .with(&ParamType::Char, Arc::new(CharParser))
        .with(&ParamType::String, Arc::new(StringParser))
        .with(&ParamType::Message, Arc::new(MessageChainParser))
        .with(&ParamType::Element, Arc::new(ElementParser))
        .with(&ParamType::PermissionId, Arc::new(PermissionIdParser))
        .with(&ParamType::PermitteeId, Arc::new(PermitteeIdParser));
    for ty in temporal {
        let parser = Arc::new(TemporalParser::new(ty.clone()));
        ctx = ctx.with(&ty, parser);
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::sender::{CollectingSender, SenderKind};

    fn parse(ty: &ParamType, raw: &str) -> Result<ArgValue, ArgumentParseError> {
        let sender = CollectingSender::new(SenderKind::Friend, PermitteeId::ExactFriend(42));
        let parser = CommandArgumentContext::builtins().parser_for(ty).unwrap();
        parser.parse_text(raw, &sender)
    }

    fn enum_names(ty: &EnumType, raw: &str) -> Option<String> {
        let sender = CollectingSender::console();
        EnumParser::new(ty.clone())
            .parse_text(raw, &sender)
            .ok()
            .and_then(|v| v.as_enum().map(|e| e.constant.clone()))
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse(&ParamType::Int, "123").unwrap(), ArgValue::Int(123));
        assert_eq!(parse(&ParamType::Long, "-9").unwrap(), ArgValue::Long(-9));
        assert_eq!(parse(&ParamType::Double, "1.5").unwrap(), ArgValue::Double(1.5));
        assert!(parse(&ParamType::Int, "abc").is_err());
        assert!(parse(&ParamType::Byte, "300").is_err());
    }

    #[test]
    fn test_boolean_and_char() {
        assert_eq!(parse(&ParamType::Boolean, "Yes").unwrap(), ArgValue::Boolean(true));
        assert_eq!(parse(&ParamType::Boolean, "nah").unwrap(), ArgValue::Boolean(false));
        assert_eq!(parse(&ParamType::Char, "x").unwrap(), ArgValue::Char('x'));
        assert!(parse(&ParamType::Char, "xy").is_err());
    }

    #[test]
    fn test_permittee_conveniences() {
        assert_eq!(
            parse(&ParamType::PermitteeId, "~").unwrap(),
            ArgValue::PermitteeId(PermitteeId::ExactFriend(42))
        );
        assert_eq!(
            parse(&ParamType::PermitteeId, "123").unwrap(),
            ArgValue::PermitteeId(PermitteeId::ExactUser(123))
        );
        assert_eq!(
            parse(&ParamType::PermitteeId, "m1.2").unwrap(),
            ArgValue::PermitteeId(PermitteeId::ExactMember(1, 2))
        );
        let sender = CollectingSender::console();
        let at = MessageElement::At {
            target: 7,
            display: String::new(),
        };
        assert_eq!(
            PermitteeIdParser.parse_element(&at, &sender).unwrap(),
            ArgValue::PermitteeId(PermitteeId::ExactUser(7))
        );
    }

    #[test]
    fn test_permission_lookup() {
        let service = Arc::new(PermissionService::new());
        let sender = CollectingSender::console();
        let parser = PermissionParser::new(Arc::clone(&service));
        assert!(parser.parse_text("*:*", &sender).is_ok());
        let err = parser.parse_text("no:such", &sender).unwrap_err();
        assert_eq!(err.to_string(), "Permission not found: no:such");
    }

    #[test]
    fn test_enum_case_insensitive() {
        let ty = EnumType::new("TestEnum", ["V1", "V2", "V3"]);
        assert_eq!(enum_names(&ty, "V1").as_deref(), Some("V1"));
        assert_eq!(enum_names(&ty, "v2").as_deref(), Some("V2"));
        assert_eq!(enum_names(&ty, "ENUM_NOT_FOUND"), None);
    }

    #[test]
    fn test_enum_exact_when_case_collides() {
        let ty = EnumType::new("TestCase", ["A", "a"]);
        assert_eq!(enum_names(&ty, "A").as_deref(), Some("A"));
        assert_eq!(enum_names(&ty, "a").as_deref(), Some("a"));
    }

    #[test]
    fn test_enum_camel_case() {
        let ty = EnumType::new("TestCamelCase", ["A", "B", "A_B"]);
        assert_eq!(enum_names(&ty, "a").as_deref(), Some("A"));
        assert_eq!(enum_names(&ty, "b").as_deref(), Some("B"));
        assert_eq!(enum_names(&ty, "A_B").as_deref(), Some("A_B"));
        assert_eq!(enum_names(&ty, "a_b").as_deref(), Some("A_B"));
        assert_eq!(enum_names(&ty, "aB").as_deref(), Some("A_B"));
    }

    #[test]
    fn test_camel_case_conversion() {
        assert_eq!(camel_case("A_B"), "aB");
        assert_eq!(camel_case("HELLO_BIG_WORLD"), "helloBigWorld");
        assert_eq!(camel_case("V1"), "v1");
    }
}
