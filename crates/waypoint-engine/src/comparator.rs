//! Type-aware ordering over cursor values.
//!
//! Values are first normalized into the declared [`CursorType`] (NUL bytes
//! stripped, textual numbers and timestamps parsed) and then compared by the
//! type's natural order, so `"10"` sorts after `9` under an `int64` cursor.

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use waypoint_types::cursor::{CursorError, CursorType, CursorValue};

/// Compares cursor values under one declared cursor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorComparator {
    cursor_type: CursorType,
}

impl CursorComparator {
    #[must_use]
    pub fn new(cursor_type: CursorType) -> Self {
        Self { cursor_type }
    }

    #[must_use]
    pub fn cursor_type(&self) -> CursorType {
        self.cursor_type
    }

    /// Sanitize `value` and coerce it into this comparator's cursor type.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the value cannot be represented in the
    /// declared type (e.g. `"abc"` under `int64`, or a timestamp under `int64`).
    pub fn normalize(&self, value: CursorValue) -> Result<CursorValue, CursorError> {
        let ty = self.cursor_type;
        let incompatible = |v: &CursorValue| CursorError::Incompatible {
            cursor_type: ty,
            found: v.kind(),
        };

        match (ty, value.sanitized()) {
            (CursorType::Utf8, CursorValue::Utf8 { value }) => Ok(CursorValue::Utf8 { value }),
            (CursorType::Utf8, other) => Ok(CursorValue::Utf8 {
                value: other.to_string(),
            }),

            (CursorType::Int64, v @ CursorValue::Int64 { .. }) => Ok(v),
            (CursorType::Int64, CursorValue::Utf8 { value }) => {
                CursorValue::parse(&value, CursorType::Int64)
            }
            (CursorType::Int64, CursorValue::Decimal { value, .. }) => {
                decimal_to_i64(&value).map(CursorValue::int64).ok_or_else(|| {
                    CursorError::Parse {
                        cursor_type: ty,
                        value,
                        reason: "not an integral 64-bit value".into(),
                    }
                })
            }

            (CursorType::TimestampMillis, v @ CursorValue::TimestampMillis { .. }) => Ok(v),
            (CursorType::TimestampMillis, CursorValue::TimestampMicros { value }) => {
                Ok(CursorValue::TimestampMillis {
                    value: value.div_euclid(1_000),
                })
            }
            (CursorType::TimestampMillis, CursorValue::Int64 { value }) => {
                Ok(CursorValue::TimestampMillis { value })
            }
            (CursorType::TimestampMillis, CursorValue::Utf8 { value }) => {
                CursorValue::parse(&value, CursorType::TimestampMillis)
            }

            (CursorType::TimestampMicros, v @ CursorValue::TimestampMicros { .. }) => Ok(v),
            (CursorType::TimestampMicros, CursorValue::TimestampMillis { value }) => value
                .checked_mul(1_000)
                .map(|value| CursorValue::TimestampMicros { value })
                .ok_or_else(|| CursorError::Parse {
                    cursor_type: ty,
                    value: value.to_string(),
                    reason: "overflows microsecond range".into(),
                }),
            (CursorType::TimestampMicros, CursorValue::Int64 { value }) => {
                Ok(CursorValue::TimestampMicros { value })
            }
            (CursorType::TimestampMicros, CursorValue::Utf8 { value }) => {
                CursorValue::parse(&value, CursorType::TimestampMicros)
            }

            (CursorType::Decimal, CursorValue::Decimal { value, .. })
            | (CursorType::Decimal, CursorValue::Utf8 { value }) => {
                CursorValue::parse(&value, CursorType::Decimal)
            }
            (CursorType::Decimal, CursorValue::Int64 { value }) => Ok(CursorValue::Decimal {
                value: value.to_string(),
                scale: 0,
            }),

            (_, other) => Err(incompatible(&other)),
        }
    }

    /// Order `a` against `b` under the declared cursor type.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if either value fails [`normalize`](Self::normalize).
    pub fn compare(&self, a: &CursorValue, b: &CursorValue) -> Result<Ordering, CursorError> {
        let a = self.normalize(a.clone())?;
        let b = self.normalize(b.clone())?;
        self.compare_normalized(&a, &b)
    }

    /// Order two values that have already been normalized by this comparator.
    pub(crate) fn compare_normalized(
        &self,
        a: &CursorValue,
        b: &CursorValue,
    ) -> Result<Ordering, CursorError> {
        match (a, b) {
            (CursorValue::Int64 { value: x }, CursorValue::Int64 { value: y })
            | (CursorValue::TimestampMillis { value: x }, CursorValue::TimestampMillis { value: y })
            | (CursorValue::TimestampMicros { value: x }, CursorValue::TimestampMicros { value: y }) => {
                Ok(x.cmp(y))
            }
            (CursorValue::Utf8 { value: x }, CursorValue::Utf8 { value: y }) => Ok(x.cmp(y)),
            (CursorValue::Decimal { value: x, .. }, CursorValue::Decimal { value: y, .. }) => {
                Ok(self.decimal(x)?.cmp(&self.decimal(y)?))
            }
            (_, other) => Err(CursorError::Incompatible {
                cursor_type: self.cursor_type,
                found: other.kind(),
            }),
        }
    }

    fn decimal(&self, raw: &str) -> Result<BigDecimal, CursorError> {
        BigDecimal::from_str(raw).map_err(|e| CursorError::Parse {
            cursor_type: self.cursor_type,
            value: raw.to_string(),
            reason: e.to_string(),
        })
    }
}

fn decimal_to_i64(raw: &str) -> Option<i64> {
    let d = BigDecimal::from_str(raw).ok()?;
    if d.is_integer() {
        d.to_i64()
    } else {
        None
    }
}
