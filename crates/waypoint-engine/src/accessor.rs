//! Typed cursor-field accessors.
//!
//! The caller hands the controller an accessor for its record type at
//! construction time; the watermark tracker never inspects record structure
//! itself.

use serde_json::Value;
use waypoint_types::cursor::CursorValue;

/// Extracts the cursor value from a record of type `R`.
///
/// Returns `None` when the record carries no cursor value (missing field or
/// explicit null); such records still count toward checkpoint frequency.
pub trait CursorAccessor<R> {
    fn cursor_value(&self, record: &R) -> Option<CursorValue>;
}

impl<R, F> CursorAccessor<R> for F
where
    F: Fn(&R) -> Option<CursorValue>,
{
    fn cursor_value(&self, record: &R) -> Option<CursorValue> {
        self(record)
    }
}

/// Reads a (possibly nested) field from a JSON object record.
///
/// The field path is dot-separated: `"meta.updated_at"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFieldAccessor {
    path: Vec<String>,
}

impl JsonFieldAccessor {
    #[must_use]
    pub fn new(cursor_field: &str) -> Self {
        Self {
            path: cursor_field.split('.').map(str::to_string).collect(),
        }
    }

    /// The dot-joined field path.
    #[must_use]
    pub fn field(&self) -> String {
        self.path.join(".")
    }

    fn lookup<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.path
            .iter()
            .try_fold(record, |node, key| node.as_object()?.get(key))
    }
}

impl CursorAccessor<Value> for JsonFieldAccessor {
    fn cursor_value(&self, record: &Value) -> Option<CursorValue> {
        match self.lookup(record)? {
            Value::Null => None,
            Value::String(s) => Some(CursorValue::utf8(s.clone())),
            Value::Number(n) => Some(match n.as_i64() {
                Some(value) => CursorValue::Int64 { value },
                None => {
                    let value = n.to_string();
                    let scale = value
                        .split_once('.')
                        .map_or(0, |(_, frac)| i32::try_from(frac.len()).unwrap_or(i32::MAX));
                    CursorValue::Decimal { value, scale }
                }
            }),
            other => Some(CursorValue::utf8(other.to_string())),
        }
    }
}
