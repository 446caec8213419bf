//! Checkpoint snapshot and checkpoint policy configuration types.
//!
//! A [`CheckpointSnapshot`] is the durable resume point a checkpointing
//! sequence hands downstream; [`CheckpointPolicyConfig`] decides how often
//! one is produced mid-stream.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cursor::{CursorPosition, CursorValue};
use crate::stream::StreamIdentity;

/// Durable resume point for one stream.
///
/// Produced by the state store after the position has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    /// Per-stream, monotonically increasing checkpoint sequence number.
    pub id: u64,
    /// Stream this checkpoint belongs to.
    pub stream: StreamIdentity,
    /// Cursor position at this checkpoint (`None` if no cursor was ever seen).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_value: Option<CursorValue>,
    /// Delivered records sharing `cursor_value`.
    pub cursor_record_count: u64,
    /// Records yielded between the previous checkpoint and this one.
    pub records_since_last_checkpoint: u64,
}

impl CheckpointSnapshot {
    /// The `(value, count)` pair this checkpoint asserts.
    #[must_use]
    pub fn position(&self) -> CursorPosition {
        CursorPosition::new(self.cursor_value.clone(), self.cursor_record_count)
    }
}

/// How pending checkpoints are released mid-stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMode {
    /// Release a pending checkpoint once a record-count or duration threshold is met.
    #[default]
    Interval,
    /// Release a pending checkpoint at the first pull after it exists.
    Eager,
}

/// Checkpoint frequency for one sync attempt.
///
/// `every_records = 0` disables count-based triggering; `every = None`
/// disables time-based triggering. With both disabled in
/// [`CheckpointMode::Interval`], only the terminal checkpoint is emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPolicyConfig {
    #[serde(default)]
    pub every_records: u64,
    #[serde(
        default,
        with = "duration_str",
        skip_serializing_if = "Option::is_none"
    )]
    pub every: Option<Duration>,
    #[serde(default)]
    pub mode: CheckpointMode,
}

impl CheckpointPolicyConfig {
    /// Count-triggered policy.
    #[must_use]
    pub fn every_records(n: u64) -> Self {
        Self {
            every_records: n,
            ..Self::default()
        }
    }

    /// Duration-triggered policy.
    #[must_use]
    pub fn every(duration: Duration) -> Self {
        Self {
            every: Some(duration),
            ..Self::default()
        }
    }

    /// Eager policy: checkpoint as soon as a pending snapshot exists.
    #[must_use]
    pub fn eager() -> Self {
        Self {
            mode: CheckpointMode::Eager,
            ..Self::default()
        }
    }

    /// Configured duration threshold, with zero treated as unset.
    #[must_use]
    pub fn effective_every(&self) -> Option<Duration> {
        self.every.filter(|d| !d.is_zero())
    }

    /// Whether any mid-stream checkpoint can ever fire.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self.mode {
            CheckpointMode::Eager => true,
            CheckpointMode::Interval => self.every_records > 0 || self.effective_every().is_some(),
        }
    }
}

/// Parse a human duration such as `"500us"`, `"250ms"`, `"30s"`, `"5m"`, or `"1h"`.
///
/// A bare integer is taken as seconds.
///
/// # Errors
///
/// Returns a description of the problem if `raw` is not a valid duration.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(format!("invalid duration '{raw}': missing number"));
    }
    let n: u64 = digits
        .parse()
        .map_err(|e| format!("invalid duration '{raw}': {e}"))?;
    match unit.trim() {
        "ns" => Ok(Duration::from_nanos(n)),
        "us" => Ok(Duration::from_micros(n)),
        "ms" => Ok(Duration::from_millis(n)),
        "" | "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(n.saturating_mul(3600))),
        other => Err(format!(
            "invalid duration '{raw}': unknown unit '{other}' (expected ns, us, ms, s, m, h)"
        )),
    }
}

/// Largest unit that represents `d` exactly, so the result parses back to `d`.
fn format_duration(d: Duration) -> String {
    const UNITS: [(u128, &str); 5] = [
        (3_600_000_000_000, "h"),
        (60_000_000_000, "m"),
        (1_000_000_000, "s"),
        (1_000_000, "ms"),
        (1_000, "us"),
    ];
    let nanos = d.as_nanos();
    UNITS
        .iter()
        .find(|(scale, _)| nanos % scale == 0)
        .map_or_else(
            || format!("{nanos}ns"),
            |(scale, unit)| format!("{}{unit}", nanos / scale),
        )
}

mod duration_str {
    use super::{format_duration, parse_duration, Duration};
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|r| parse_duration(&r).map_err(serde::de::Error::custom))
            .transpose()
    }
}
