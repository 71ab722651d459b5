//! Date and time argument parsers.
//!
//! Every parser accepts `now` and the ISO-8601 text its value formats to, so
//! formatting a parsed value and parsing it again gives the same value.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    Utc,
};

use super::argument::{ArgValue, ArgumentParseError, ParamType, ValueArgumentParser};
use super::sender::CommandSender;

const LOCAL_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A month of a year, `2024-05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

/// A day of a month, `--05-17`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for YearMonth {
    type Err = ArgumentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || illegal(s, "YearMonth");
        let (year, month) = s.rsplit_once('-').ok_or_else(bad)?;
        let year: i32 = year.parse().map_err(|_| bad())?;
        let month: u32 = month.parse().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(bad());
        }
        Ok(YearMonth { year, month })
    }
}

impl FromStr for MonthDay {
    type Err = ArgumentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || illegal(s, "MonthDay");
        let rest = s.strip_prefix("--").ok_or_else(bad)?;
        let (month, day) = rest.split_once('-').ok_or_else(bad)?;
        let month: u32 = month.parse().map_err(|_| bad())?;
        let day: u32 = day.parse().map_err(|_| bad())?;
        // 2000 is a leap year, so --02-29 is accepted
        NaiveDate::from_ymd_opt(2000, month, day).ok_or_else(bad)?;
        Ok(MonthDay { month, day })
    }
}

fn illegal(raw: &str, ty: &str) -> ArgumentParseError {
    ArgumentParseError::Illegal(format!("cannot parse '{}' as {}", raw, ty))
}

// ============================================================================
// Formatting
// ============================================================================

pub fn format_instant(v: &DateTime<Utc>) -> String {
    v.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn format_local_date_time(v: &NaiveDateTime) -> String {
    v.format(LOCAL_DATE_TIME_FORMAT).to_string()
}

pub fn format_offset_date_time(v: &DateTime<FixedOffset>) -> String {
    v.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    if s == "Z" || s == "z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let mut parts = rest.split(':');
    let hours: i32 = parts.next()?.parse().ok()?;
    let minutes: i32 = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    let seconds: i32 = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    if parts.next().is_some() || hours > 18 || minutes > 59 || seconds > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60 + seconds))
}

// ============================================================================
// Parser
// ============================================================================

/// Parses any of the temporal [`ParamType`]s.
pub struct TemporalParser {
    ty: ParamType,
}

impl TemporalParser {
    pub fn new(ty: ParamType) -> Self {
        Self { ty }
    }

    fn now(&self) -> Option<ArgValue> {
        let local = Local::now();
        let value = match self.ty {
            ParamType::Instant => ArgValue::Instant(Utc::now()),
            ParamType::LocalDate => ArgValue::LocalDate(local.date_naive()),
            ParamType::LocalTime => ArgValue::LocalTime(local.time()),
            ParamType::LocalDateTime => ArgValue::LocalDateTime(local.naive_local()),
            ParamType::OffsetDateTime => ArgValue::OffsetDateTime(local.fixed_offset()),
            ParamType::ZoneOffset => ArgValue::ZoneOffset(*local.offset()),
            ParamType::Year => ArgValue::Year(local.year()),
            ParamType::YearMonth => ArgValue::YearMonth(YearMonth {
                year: local.year(),
                month: local.month(),
            }),
            ParamType::MonthDay => ArgValue::MonthDay(MonthDay {
                month: local.month(),
                day: local.day(),
            }),
            _ => return None,
        };
        Some(value)
    }

    fn parse(&self, raw: &str) -> Option<ArgValue> {
        let value = match self.ty {
            ParamType::Instant => {
                ArgValue::Instant(DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc))
            }
            ParamType::LocalDate => ArgValue::LocalDate(NaiveDate::from_str(raw).ok()?),
            ParamType::LocalTime => ArgValue::LocalTime(NaiveTime::from_str(raw).ok()?),
            ParamType::LocalDateTime => ArgValue::LocalDateTime(
                NaiveDateTime::parse_from_str(raw, LOCAL_DATE_TIME_FORMAT).ok()?,
            ),
            ParamType::OffsetDateTime => {
                ArgValue::OffsetDateTime(DateTime::parse_from_rfc3339(raw).ok()?)
            }
            ParamType::ZoneOffset => ArgValue::ZoneOffset(parse_offset(raw)?),
            ParamType::Year => ArgValue::Year(raw.parse().ok()?),
            ParamType::YearMonth => ArgValue::YearMonth(raw.parse().ok()?),
            ParamType::MonthDay => ArgValue::MonthDay(raw.parse().ok()?),
            _ => return None,
        };
        Some(value)
    }
}

impl ValueArgumentParser for TemporalParser {
    fn parse_text(
        &self,
        raw: &str,
        _sender: &dyn CommandSender,
    ) -> Result<ArgValue, ArgumentParseError> {
        let raw = raw.trim();
        let parsed = if raw.eq_ignore_ascii_case("now") {
            self.now()
        } else {
            self.parse(raw)
        };
        parsed.ok_or_else(|| illegal(raw, self.ty.name()))
    }
}
