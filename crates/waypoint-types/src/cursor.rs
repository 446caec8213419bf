//! Cursor types for incremental sync position tracking.
//!
//! Cursors mark the last-read position in a source stream so that
//! subsequent runs can resume from where the previous run left off.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Data type of a cursor value.
///
/// Determines how cursor values are compared and how configured initial
/// values are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum CursorType {
    /// 64-bit signed integer cursor.
    Int64,
    /// UTF-8 string cursor, ordered lexicographically.
    Utf8,
    /// Millisecond-precision timestamp cursor.
    TimestampMillis,
    /// Microsecond-precision timestamp cursor.
    TimestampMicros,
    /// Arbitrary-precision decimal cursor.
    Decimal,
}

impl CursorType {
    /// Wire-format name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Utf8 => "utf8",
            Self::TimestampMillis => "timestamp_millis",
            Self::TimestampMicros => "timestamp_micros",
            Self::Decimal => "decimal",
        }
    }
}

impl fmt::Display for CursorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed cursor position value.
///
/// Each variant carries its value in a named `value` field for clean
/// JSON serialization: `{"type": "int64", "value": 42}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CursorValue {
    /// 64-bit signed integer position.
    Int64 { value: i64 },
    /// UTF-8 string position.
    Utf8 { value: String },
    /// Millisecond-precision timestamp position (Unix epoch).
    TimestampMillis { value: i64 },
    /// Microsecond-precision timestamp position (Unix epoch).
    TimestampMicros { value: i64 },
    /// Arbitrary-precision decimal position.
    Decimal { value: String, scale: i32 },
}

impl CursorValue {
    /// Shorthand for a UTF-8 cursor value.
    #[must_use]
    pub fn utf8(value: impl Into<String>) -> Self {
        Self::Utf8 {
            value: value.into(),
        }
    }

    /// Shorthand for an integer cursor value.
    #[must_use]
    pub fn int64(value: i64) -> Self {
        Self::Int64 { value }
    }

    #[must_use]
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int64 { value } => Some(*value),
            _ => None,
        }
    }

    /// Strip embedded NUL characters from string-bearing variants.
    ///
    /// Relational destinations reject `\u{0000}` in text columns, so cursor
    /// values are never stored or compared with them.
    #[must_use]
    pub fn sanitized(self) -> Self {
        match self {
            Self::Utf8 { value } if value.contains('\0') => Self::Utf8 {
                value: value.replace('\0', ""),
            },
            Self::Decimal { value, scale } if value.contains('\0') => Self::Decimal {
                value: value.replace('\0', ""),
                scale,
            },
            other => other,
        }
    }

    /// Variant name, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int64 { .. } => "int64",
            Self::Utf8 { .. } => "utf8",
            Self::TimestampMillis { .. } => "timestamp_millis",
            Self::TimestampMicros { .. } => "timestamp_micros",
            Self::Decimal { .. } => "decimal",
        }
    }

    /// Parse a textual cursor (e.g. a configured initial value) as `cursor_type`.
    ///
    /// Timestamps accept an integer epoch offset in the type's unit, an
    /// RFC 3339 string, or an offset-less datetime or date taken as UTC.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Parse`] if `raw` is not a valid `cursor_type` value.
    pub fn parse(raw: &str, cursor_type: CursorType) -> Result<Self, CursorError> {
        let raw = raw.replace('\0', "");
        let trimmed = raw.trim();
        let parse_err = |reason: String| CursorError::Parse {
            cursor_type,
            value: trimmed.to_string(),
            reason,
        };

        match cursor_type {
            CursorType::Utf8 => Ok(Self::Utf8 { value: raw.clone() }),
            CursorType::Int64 => trimmed
                .parse::<i64>()
                .map(|value| Self::Int64 { value })
                .map_err(|e| parse_err(e.to_string())),
            CursorType::TimestampMillis => parse_epoch(trimmed, |dt| dt.timestamp_millis())
                .map(|value| Self::TimestampMillis { value })
                .map_err(parse_err),
            CursorType::TimestampMicros => parse_epoch(trimmed, |dt| dt.timestamp_micros())
                .map(|value| Self::TimestampMicros { value })
                .map_err(parse_err),
            CursorType::Decimal => {
                let parsed = BigDecimal::from_str(trimmed).map_err(|e| parse_err(e.to_string()))?;
                let (_, exponent) = parsed.as_bigint_and_exponent();
                let scale = i32::try_from(exponent)
                    .map_err(|_| parse_err(format!("scale {exponent} out of range")))?;
                Ok(Self::Decimal {
                    value: trimmed.to_string(),
                    scale,
                })
            }
        }
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64 { value }
            | Self::TimestampMillis { value }
            | Self::TimestampMicros { value } => write!(f, "{value}"),
            Self::Utf8 { value } | Self::Decimal { value, .. } => f.write_str(value),
        }
    }
}

/// Offset-less layouts, read as UTC.
const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_epoch(raw: &str, to_epoch: impl Fn(&DateTime<Utc>) -> i64) -> Result<i64, String> {
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z"))
    {
        return Ok(to_epoch(&dt.with_timezone(&Utc)));
    }
    if let Some(naive) = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Ok(to_epoch(&naive.and_utc()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| to_epoch(&naive.and_utc()))
        .ok_or_else(|| {
            "expected an epoch offset, an RFC 3339 timestamp, or YYYY-MM-DD[ HH:MM:SS[.f]]"
                .to_string()
        })
}

/// The `(value, count)` pair a watermark is made of.
///
/// `record_count` is how many records carrying `value` have been delivered,
/// which lets a resumed sync skip exactly those records at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Highest cursor value observed (`None` before any value is seen).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CursorValue>,
    /// Number of delivered records sharing `value`.
    #[serde(default)]
    pub record_count: u64,
}

impl CursorPosition {
    /// Position at `value` with `record_count` records.
    #[must_use]
    pub fn new(value: Option<CursorValue>, record_count: u64) -> Self {
        Self {
            value,
            record_count,
        }
    }
}

/// Errors raised while parsing or comparing cursor values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    /// A value could not be interpreted as the declared cursor type.
    #[error("cannot parse cursor value '{value}' as {cursor_type}: {reason}")]
    Parse {
        cursor_type: CursorType,
        value: String,
        reason: String,
    },
    /// A value's variant cannot be ordered under the declared cursor type.
    #[error("cursor value of kind {found} is not comparable as {cursor_type}")]
    Incompatible {
        cursor_type: CursorType,
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_value_int64_json_format() {
        let cv = CursorValue::Int64 { value: 42 };
        let json = serde_json::to_value(&cv).unwrap();
        assert_eq!(json, serde_json::json!({"type": "int64", "value": 42}));
    }

    #[test]
    fn cursor_position_skips_absent_value() {
        let json = serde_json::to_value(CursorPosition::default()).unwrap();
        assert_eq!(json, serde_json::json!({"record_count": 0}));
    }

    #[test]
    fn sanitized_strips_nul_bytes() {
        let cv = CursorValue::utf8("abc\u{0000}def").sanitized();
        assert_eq!(cv, CursorValue::utf8("abcdef"));
        assert_eq!(CursorValue::int64(7).sanitized(), CursorValue::int64(7));
    }

    #[test]
    fn parse_int64() {
        assert_eq!(
            CursorValue::parse(" 42 ", CursorType::Int64).unwrap(),
            CursorValue::int64(42)
        );
        let err = CursorValue::parse("forty-two", CursorType::Int64).unwrap_err();
        assert!(err.to_string().contains("int64"), "got: {err}");
    }

    #[test]
    fn parse_timestamp_accepts_rfc3339_and_epoch() {
        let from_text = CursorValue::parse("2024-01-15T10:00:00Z", CursorType::TimestampMillis).unwrap();
        assert_eq!(
            from_text,
            CursorValue::TimestampMillis {
                value: 1_705_312_800_000
            }
        );
        let from_epoch = CursorValue::parse("1705312800000000", CursorType::TimestampMicros).unwrap();
        assert_eq!(
            from_epoch,
            CursorValue::TimestampMicros {
                value: 1_705_312_800_000_000
            }
        );
        assert!(CursorValue::parse("yesterday", CursorType::TimestampMicros).is_err());
    }

    #[test]
    fn parse_timestamp_without_offset_is_utc() {
        let expected = CursorValue::TimestampMicros {
            value: 1_705_312_800_000_000,
        };
        for raw in [
            "2024-01-15T10:00:00",
            "2024-01-15 10:00:00",
            "2024-01-15 10:00:00.000",
            "2024-01-15 12:00:00+02:00",
        ] {
            assert_eq!(
                CursorValue::parse(raw, CursorType::TimestampMicros).unwrap(),
                expected,
                "{raw}"
            );
        }
        assert_eq!(
            CursorValue::parse("2024-01-15", CursorType::TimestampMillis).unwrap(),
            CursorValue::TimestampMillis {
                value: 1_705_276_800_000
            }
        );
        assert!(CursorValue::parse("2024-13-45", CursorType::TimestampMillis).is_err());
    }

    #[test]
    fn parse_decimal_records_scale() {
        let cv = CursorValue::parse("12.500", CursorType::Decimal).unwrap();
        assert_eq!(
            cv,
            CursorValue::Decimal {
                value: "12.500".into(),
                scale: 3
            }
        );
    }

    #[test]
    fn parse_utf8_strips_nul() {
        let cv = CursorValue::parse("ab\u{0000}c", CursorType::Utf8).unwrap();
        assert_eq!(cv, CursorValue::utf8("abc"));
    }

    #[test]
    fn cursor_type_serde_names() {
        for (ty, expected) in [
            (CursorType::Int64, "\"int64\""),
            (CursorType::TimestampMicros, "\"timestamp_micros\""),
            (CursorType::Decimal, "\"decimal\""),
        ] {
            assert_eq!(serde_json::to_string(&ty).unwrap(), expected);
            assert_eq!(format!("\"{ty}\""), expected);
        }
    }
}
