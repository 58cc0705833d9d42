//! Conversion of raw fields to typed values.
//!
//! Custom converters take precedence over everything. Otherwise missing,
//! empty and null-sentinel values become [`Value::Null`] and the rest is
//! parsed according to the column's declared type and style hints.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::error::{CsvError, Result};
use crate::value::{DataType, Value};

/// Numeric parsing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberStyle {
    /// Ignore leading and trailing whitespace.
    pub allow_whitespace: bool,
    /// Accept a leading `+` or `-`.
    pub allow_sign: bool,
    /// Accept group separators between digits.
    pub allow_thousands: bool,
    pub allow_decimal_point: bool,
    pub allow_exponent: bool,
    /// Hexadecimal digits, optionally prefixed with `0x`.
    pub allow_hex: bool,
    pub decimal_separator: char,
    pub group_separator: char,
}

impl NumberStyle {
    /// Optional sign and digits.
    #[must_use]
    pub const fn integer() -> Self {
        Self {
            allow_whitespace: true,
            allow_sign: true,
            allow_thousands: false,
            allow_decimal_point: false,
            allow_exponent: false,
            allow_hex: false,
            decimal_separator: '.',
            group_separator: ',',
        }
    }

    /// Sign, digits, group separators and a decimal point.
    #[must_use]
    pub const fn number() -> Self {
        Self {
            allow_thousands: true,
            allow_decimal_point: true,
            ..Self::integer()
        }
    }

    /// Sign, digits, group separators, decimal point and exponent.
    #[must_use]
    pub const fn float() -> Self {
        Self {
            allow_exponent: true,
            ..Self::number()
        }
    }

    /// Hexadecimal digits only.
    #[must_use]
    pub const fn hex() -> Self {
        Self {
            allow_sign: false,
            allow_hex: true,
            ..Self::integer()
        }
    }

    /// Use culture-specific separators, e.g. `(',', '.')` for `1.234,5`.
    #[must_use]
    pub const fn with_separators(mut self, decimal: char, group: char) -> Self {
        self.decimal_separator = decimal;
        self.group_separator = group;
        self
    }
}

impl Default for NumberStyle {
    fn default() -> Self {
        Self::float()
    }
}

/// Date parsing rules: `chrono` format strings tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateStyle {
    pub formats: Vec<String>,
}

const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y",
    "%d.%m.%Y",
];

impl DateStyle {
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            formats: formats.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for DateStyle {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMATS.iter().copied())
    }
}

/// Reader-level settings the conversion needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertContext<'a> {
    pub null_value: Option<&'a str>,
    pub boolean_tokens: Option<&'a BTreeMap<String, bool>>,
}

impl ConvertContext<'_> {
    fn is_null_token(&self, text: &str) -> bool {
        self.null_value
            .is_some_and(|sentinel| sentinel.eq_ignore_ascii_case(text))
    }
}

/// Convert `raw` using the column's declared type.
pub fn convert(column: &Column, raw: Option<&str>, ctx: &ConvertContext<'_>) -> Result<Value> {
    convert_as(column, column.data_type, raw, ctx)
}

/// Convert `raw` as `data_type`, keeping the column's converter and hints.
pub fn convert_as(
    column: &Column,
    data_type: DataType,
    raw: Option<&str>,
    ctx: &ConvertContext<'_>,
) -> Result<Value> {
    if let Some(converter) = column.converter() {
        return converter(raw).map_err(CsvError::Converter);
    }
    let Some(text) = raw else {
        return Ok(Value::Null);
    };
    if text.is_empty() || ctx.is_null_token(text) {
        return Ok(Value::Null);
    }
    let fail = || CsvError::conversion(&column.name, text, data_type);
    match data_type {
        DataType::String => Ok(Value::String(text.to_string())),
        DataType::Bool => match ctx.boolean_tokens {
            Some(tokens) => Ok(lookup_token(tokens, text).map_or(Value::Null, Value::Bool)),
            None => parse_bool(text).map(Value::Bool).ok_or_else(fail),
        },
        DataType::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Ok(Value::Char(ch)),
                _ => Err(fail()),
            }
        }
        DataType::I8
        | DataType::I16
        | DataType::I32
        | DataType::I64
        | DataType::U8
        | DataType::U16
        | DataType::U32
        | DataType::U64 => {
            let style = column.number_style.unwrap_or_else(NumberStyle::integer);
            let value = parse_integer(text, &style).ok_or_else(fail)?;
            let (min, max) = data_type.integer_range().ok_or_else(fail)?;
            if value < min || value > max {
                return Err(fail());
            }
            if data_type.is_unsigned() {
                u64::try_from(value).map(Value::UInt).map_err(|_| fail())
            } else {
                i64::try_from(value).map(Value::Int).map_err(|_| fail())
            }
        }
        DataType::F32 | DataType::F64 => {
            let style = column.number_style.unwrap_or_else(NumberStyle::float);
            let value = parse_float(text, &style).ok_or_else(fail)?;
            if data_type == DataType::F32 {
                if value.is_finite() && value.abs() > f64::from(f32::MAX) {
                    return Err(fail());
                }
                Ok(Value::Float(f64::from(value as f32)))
            } else {
                Ok(Value::Float(value))
            }
        }
        DataType::Date => parse_date_time(text, column.date_style.as_ref())
            .map(|value| Value::Date(value.date()))
            .ok_or_else(fail),
        DataType::DateTime => parse_date_time(text, column.date_style.as_ref())
            .map(Value::DateTime)
            .ok_or_else(fail),
    }
}

fn lookup_token(tokens: &BTreeMap<String, bool>, text: &str) -> Option<bool> {
    tokens.get(text).copied().or_else(|| {
        tokens
            .iter()
            .find(|(token, _)| token.eq_ignore_ascii_case(text))
            .map(|(_, value)| *value)
    })
}

/// Built-in boolean tokens: `true`/`false` (any case) and `1`/`0`.
pub fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") || text == "1" {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") || text == "0" {
        Some(false)
    } else {
        None
    }
}

/// Parse an integer; a fractional part is accepted only if it is all zeros
/// and the style allows a decimal point.
pub fn parse_integer(text: &str, style: &NumberStyle) -> Option<i128> {
    let text = if style.allow_whitespace {
        text.trim()
    } else {
        text
    };
    if text.is_empty() {
        return None;
    }
    if style.allow_hex {
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        return i128::from_str_radix(digits, 16).ok();
    }

    let (negative, digits) = split_sign(text, style)?;
    let mut value: i128 = 0;
    let mut seen_digit = false;
    let mut last_was_group = false;
    let mut in_fraction = false;
    for ch in digits.chars() {
        if let Some(digit) = ch.to_digit(10) {
            if in_fraction {
                if digit != 0 {
                    return None;
                }
            } else {
                value = value.checked_mul(10)?.checked_add(i128::from(digit))?;
            }
            seen_digit = true;
            last_was_group = false;
        } else if style.allow_thousands
            && ch == style.group_separator
            && !in_fraction
            && seen_digit
            && !last_was_group
        {
            last_was_group = true;
        } else if style.allow_decimal_point && ch == style.decimal_separator && !in_fraction {
            in_fraction = true;
            last_was_group = false;
        } else {
            return None;
        }
    }
    if !seen_digit || last_was_group {
        return None;
    }
    Some(if negative { -value } else { value })
}

fn split_sign<'a>(text: &'a str, style: &NumberStyle) -> Option<(bool, &'a str)> {
    match text.as_bytes().first() {
        Some(b'-') if style.allow_sign => Some((true, &text[1..])),
        Some(b'+') if style.allow_sign => Some((false, &text[1..])),
        Some(b'-' | b'+') => None,
        _ => Some((false, text)),
    }
}

/// Parse a float with culture separators; `NaN` and `Infinity` are accepted.
pub fn parse_float(text: &str, style: &NumberStyle) -> Option<f64> {
    let text = if style.allow_whitespace {
        text.trim()
    } else {
        text
    };
    if text.is_empty() {
        return None;
    }
    if text.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    let (negative, body) = split_sign(text, style)?;
    if body.eq_ignore_ascii_case("inf") || body.eq_ignore_ascii_case("infinity") {
        return Some(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let mut cleaned = String::with_capacity(text.len());
    if negative {
        cleaned.push('-');
    }
    let mut prev = None;
    for ch in body.chars() {
        if ch.is_ascii_digit() {
            cleaned.push(ch);
        } else if style.allow_thousands && ch == style.group_separator {
            // dropped
        } else if style.allow_decimal_point && ch == style.decimal_separator {
            cleaned.push('.');
        } else if style.allow_exponent && (ch == 'e' || ch == 'E') {
            cleaned.push('e');
        } else if (ch == '+' || ch == '-') && matches!(prev, Some('e' | 'E')) {
            cleaned.push(ch);
        } else {
            return None;
        }
        prev = Some(ch);
    }
    cleaned.parse().ok()
}

/// Parse a date or date-time; dates become midnight.
pub fn parse_date_time(text: &str, style: Option<&DateStyle>) -> Option<NaiveDateTime> {
    let text = text.trim();
    let parse = |format: &str| {
        NaiveDateTime::parse_from_str(text, format).ok().or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
    };
    match style {
        Some(style) => style.formats.iter().find_map(|format| parse(format)),
        None => DEFAULT_DATE_FORMATS.iter().find_map(|format| parse(format)),
    }
}
