//! Lossless type coercion
//!
//! A column is cast only when every non-blank value satisfies one predicate.
//! A single exception keeps the whole column as text, so identifiers such as
//! `00123` are never turned into numbers.

use crate::error::{RepairError, Result};
use crate::patterns::{float_literal, integer_literal, iso_date};
use crate::table::{is_protected, ColumnData, RawTable, RepairedTable, PROCESSED_AT};
use chrono::NaiveDate;
use intake_common::ColumnType;
use serde::Serialize;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Per-column type recommendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnTypeDecision {
    pub column_name: String,
    pub recommended_type: ColumnType,
}

/// Empty, whitespace-only, or a configured null sentinel such as `N/A`
pub fn is_blank(value: &str, sentinels: &[String]) -> bool {
    let value = value.trim();
    value.is_empty() || sentinels.iter().any(|s| s.eq_ignore_ascii_case(value))
}

pub fn is_boolean_literal(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
}

/// Optional sign, no leading zero, fits in an `i64`
pub fn is_integer_literal(value: &str) -> bool {
    integer_literal().is_match(value) && value.parse::<i64>().is_ok()
}

/// Decimal or exponent notation without a leading zero whose `f64` value
/// keeps every significant digit. Integer-shaped text must also fit an `i64`.
pub fn is_float_literal(value: &str) -> bool {
    if !float_literal().is_match(value) {
        return false;
    }
    if integer_literal().is_match(value) && value.parse::<i64>().is_err() {
        return false;
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() => {
            let written = decimal_parts(value);
            written.is_some() && written == decimal_parts(&format!("{:e}", f))
        },
        _ => false,
    }
}

/// Sign, significant digits and power-of-ten exponent of a decimal literal,
/// with insignificant zeros removed. Zero has no digits and no sign.
fn decimal_parts(literal: &str) -> Option<(bool, String, i64)> {
    let (negative, unsigned) = match literal.as_bytes().first().copied()? {
        b'-' => (true, &literal[1..]),
        b'+' => (false, &literal[1..]),
        _ => (false, literal),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], unsigned[at + 1..].parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = format!("{}{}", whole, fraction);
    let significant = digits.trim_start_matches('0');
    let trimmed = significant.trim_end_matches('0');
    if trimmed.is_empty() {
        return Some((false, String::new(), 0));
    }

    let fraction_len = i64::try_from(fraction.len()).ok()?;
    let trailing = i64::try_from(significant.len() - trimmed.len()).ok()?;
    Some((negative, trimmed.to_string(), exponent - fraction_len + trailing))
}

/// `YYYY-MM-DD` naming a real calendar day
pub fn is_date_literal(value: &str) -> bool {
    iso_date().is_match(value) && NaiveDate::parse_from_str(value, DATE_FORMAT).is_ok()
}

/// Pick the narrowest type every non-blank value satisfies.
pub fn decide_column_type<'a, I>(values: I, sentinels: &[String]) -> ColumnType
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let present: Vec<&str> = values
        .into_iter()
        .flatten()
        .filter(|v| !is_blank(v, sentinels))
        .map(str::trim)
        .collect();

    if present.is_empty() {
        return ColumnType::Text;
    }

    let all = |predicate: fn(&str) -> bool| present.iter().all(|v| predicate(v));
    if all(is_boolean_literal) {
        ColumnType::Boolean
    } else if all(is_integer_literal) {
        ColumnType::Integer
    } else if all(is_float_literal) {
        ColumnType::Float
    } else if all(is_date_literal) {
        ColumnType::Date
    } else {
        ColumnType::Text
    }
}

/// Decide and apply column types for a raw table.
///
/// Engine-written columns from an earlier repair pass (`processed_at`,
/// `is_duplicate`, `is_shifted`) are carried verbatim.
pub fn coerce_table(
    raw: &RawTable,
    sentinels: &[String],
) -> Result<(RepairedTable, Vec<ColumnTypeDecision>)> {
    let mut table = RepairedTable::new(raw.row_count());
    let mut decisions = Vec::with_capacity(raw.columns.len());

    for (index, name) in raw.columns.iter().enumerate() {
        let target = if is_protected(name) {
            engine_column_type(name, raw.column_values(index))
        } else {
            decide_column_type(raw.column_values(index), sentinels)
        };

        let data = cast_column(name, raw.column_values(index), target, sentinels)?;
        decisions.push(ColumnTypeDecision {
            column_name: name.clone(),
            recommended_type: target,
        });
        table.push(name.clone(), data);
    }

    Ok((table, decisions))
}

/// Engine-written columns are never inferred. Flags written as the engine's
/// own `true`/`false` stay boolean; anything else, `processed_at` included,
/// is carried as text.
fn engine_column_type<'a, I>(name: &str, values: I) -> ColumnType
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    if name == PROCESSED_AT {
        return ColumnType::Text;
    }
    let engine_flag = |v: Option<&str>| matches!(v, None | Some("true") | Some("false"));
    if values.into_iter().all(engine_flag) {
        ColumnType::Boolean
    } else {
        ColumnType::Text
    }
}

fn cast_column<'a, I>(
    name: &str,
    values: I,
    target: ColumnType,
    sentinels: &[String],
) -> Result<ColumnData>
where
    I: Iterator<Item = Option<&'a str>>,
{
    if target == ColumnType::Text {
        return Ok(ColumnData::Text(values.map(|v| v.map(str::to_string)).collect()));
    }

    let failure = |value: &str| RepairError::TypeCoercion {
        column: name.to_string(),
        value: value.to_string(),
        target,
    };
    let present = |v: Option<&'a str>| v.filter(|v| !is_blank(v, sentinels)).map(str::trim);

    let data = match target {
        ColumnType::Boolean => ColumnData::Boolean(
            values
                .map(|v| {
                    present(v)
                        .map(|v| match v.to_ascii_lowercase().as_str() {
                            "true" => Ok(true),
                            "false" => Ok(false),
                            _ => Err(failure(v)),
                        })
                        .transpose()
                })
                .collect::<Result<_>>()?,
        ),
        ColumnType::Integer => ColumnData::Integer(
            values
                .map(|v| present(v).map(|v| v.parse::<i64>().map_err(|_| failure(v))).transpose())
                .collect::<Result<_>>()?,
        ),
        ColumnType::Float => ColumnData::Float(
            values
                .map(|v| {
                    present(v)
                        .map(|v| match v.parse::<f64>() {
                            Ok(f) if f.is_finite() => Ok(f),
                            _ => Err(failure(v)),
                        })
                        .transpose()
                })
                .collect::<Result<_>>()?,
        ),
        ColumnType::Date => ColumnData::Date(
            values
                .map(|v| {
                    present(v)
                        .map(|v| NaiveDate::parse_from_str(v, DATE_FORMAT).map_err(|_| failure(v)))
                        .transpose()
                })
                .collect::<Result<_>>()?,
        ),
        ColumnType::Timestamp | ColumnType::Text => {
            return Err(failure("<unsupported coercion target>"));
        },
    };

    Ok(data)
}
