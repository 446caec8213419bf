//! Per-stream cursor watermark tracking.
//!
//! [`CursorWatermarkTracker`] ingests records one at a time and maintains the
//! stream's high watermark: the largest cursor value seen and how many
//! records have carried it. Whenever the watermark advances it captures a
//! [`PendingCheckpoint`] from the state *before* the advancing record, so a
//! pending checkpoint never covers a record the consumer has not received.

use std::cmp::Ordering;

use waypoint_types::cursor::{CursorError, CursorPosition, CursorValue};
use waypoint_types::stream::StreamIdentity;

use crate::accessor::CursorAccessor;
use crate::comparator::CursorComparator;

/// A resume point captured by the tracker but not yet persisted or emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCheckpoint {
    pub position: CursorPosition,
}

/// A record whose cursor compared below the current watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfOrderCursor {
    /// The offending (normalized) cursor value.
    pub value: CursorValue,
    /// Watermark at the time the record was observed.
    pub watermark: CursorValue,
    /// 1-based position of the record within this pull.
    pub record_number: u64,
}

/// Outcome of observing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The record had no cursor value; only counters changed.
    NoCursor,
    /// The watermark moved to the record's value.
    Advanced { pending_captured: bool },
    /// The record repeated the current watermark value.
    Repeated,
    /// The record's value is below the watermark; state was left untouched.
    OutOfOrder(OutOfOrderCursor),
}

/// Watermark state machine for one stream, owned by one sequence.
#[derive(Debug)]
pub struct CursorWatermarkTracker<A> {
    stream: StreamIdentity,
    accessor: A,
    comparator: CursorComparator,
    current: CursorPosition,
    /// `current` is still the seeded starting value, which is already durable.
    at_seed: bool,
    total_records_seen: u64,
    pending: Option<PendingCheckpoint>,
    checkpointing_enabled: bool,
    out_of_order: u64,
}

impl<A> CursorWatermarkTracker<A> {
    /// Create a tracker seeded at `seed`.
    ///
    /// `checkpointing_enabled = false` suppresses pending-checkpoint capture;
    /// only [`final_snapshot`](Self::final_snapshot) is then meaningful.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the seed value is not valid for the
    /// comparator's cursor type.
    pub fn new(
        stream: StreamIdentity,
        seed: CursorPosition,
        comparator: CursorComparator,
        accessor: A,
        checkpointing_enabled: bool,
    ) -> Result<Self, CursorError> {
        let value = seed.value.map(|v| comparator.normalize(v)).transpose()?;
        Ok(Self {
            stream,
            accessor,
            comparator,
            current: CursorPosition::new(value, seed.record_count),
            at_seed: true,
            total_records_seen: 0,
            pending: None,
            checkpointing_enabled,
            out_of_order: 0,
        })
    }

    /// Observe one record, extracting its cursor through the accessor.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the record's cursor value cannot be
    /// interpreted under the stream's cursor type.
    pub fn observe<R>(&mut self, record: &R) -> Result<Observation, CursorError>
    where
        A: CursorAccessor<R>,
    {
        let candidate = self.accessor.cursor_value(record);
        self.observe_value(candidate)
    }

    /// Observe one record given its already-extracted cursor value.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if `candidate` cannot be interpreted under the
    /// stream's cursor type.
    pub fn observe_value(
        &mut self,
        candidate: Option<CursorValue>,
    ) -> Result<Observation, CursorError> {
        self.total_records_seen += 1;

        let Some(candidate) = candidate else {
            return Ok(Observation::NoCursor);
        };
        let candidate = self.comparator.normalize(candidate)?;

        let ordering = match &self.current.value {
            None => Ordering::Greater,
            Some(current) => self.comparator.compare_normalized(&candidate, current)?,
        };

        match ordering {
            Ordering::Greater => {
                let pending_captured = self.checkpointing_enabled && !self.at_seed;
                if pending_captured {
                    // Supersedes any older pending checkpoint; the new one
                    // covers strictly more delivered records.
                    self.pending = Some(PendingCheckpoint {
                        position: self.current.clone(),
                    });
                }
                self.current = CursorPosition::new(Some(candidate), 1);
                self.at_seed = false;
                Ok(Observation::Advanced { pending_captured })
            }
            Ordering::Equal => {
                self.current.record_count += 1;
                Ok(Observation::Repeated)
            }
            Ordering::Less => {
                self.out_of_order += 1;
                let watermark = self.current.value.clone().unwrap_or_else(|| candidate.clone());
                Ok(Observation::OutOfOrder(OutOfOrderCursor {
                    value: candidate,
                    watermark,
                    record_number: self.total_records_seen,
                }))
            }
        }
    }

    /// Take the outstanding pending checkpoint, if any.
    ///
    /// Calling this with nothing pending is a no-op returning `None`.
    pub fn take_pending_snapshot(&mut self) -> Option<PendingCheckpoint> {
        self.pending.take()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Snapshot of the current watermark, whether or not it advanced.
    ///
    /// Used once at stream exhaustion; discards any pending checkpoint, which
    /// the final snapshot supersedes.
    pub fn final_snapshot(&mut self) -> PendingCheckpoint {
        self.pending = None;
        PendingCheckpoint {
            position: self.current.clone(),
        }
    }

    /// Current watermark.
    #[must_use]
    pub fn watermark(&self) -> &CursorPosition {
        &self.current
    }

    #[must_use]
    pub fn total_records_seen(&self) -> u64 {
        self.total_records_seen
    }

    /// Whether any out-of-order cursor has been seen. Once degraded, the
    /// stream's checkpoints no longer guarantee lossless resumption.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.out_of_order > 0
    }

    #[must_use]
    pub fn stream(&self) -> &StreamIdentity {
        &self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::cursor::CursorType;

    type IntAccessor = fn(&i64) -> Option<CursorValue>;

    fn int_cursor(r: &i64) -> Option<CursorValue> {
        Some(CursorValue::int64(*r))
    }

    fn tracker(seed: Option<i64>, enabled: bool) -> CursorWatermarkTracker<IntAccessor> {
        CursorWatermarkTracker::new(
            StreamIdentity::new("orders"),
            CursorPosition::new(seed.map(CursorValue::int64), 0),
            CursorComparator::new(CursorType::Int64),
            int_cursor as IntAccessor,
            enabled,
        )
        .unwrap()
    }

    fn at(v: i64, n: u64) -> CursorPosition {
        CursorPosition::new(Some(CursorValue::int64(v)), n)
    }

    #[test]
    fn first_value_never_captures_pending() {
        let mut t = tracker(None, true);
        assert_eq!(
            t.observe(&1).unwrap(),
            Observation::Advanced {
                pending_captured: false
            }
        );
        assert!(!t.has_pending());
        assert_eq!(t.watermark(), &at(1, 1));
    }

    #[test]
    fn advance_captures_pre_update_state() {
        let mut t = tracker(None, true);
        t.observe(&1).unwrap();
        t.observe(&1).unwrap();
        assert_eq!(
            t.observe(&2).unwrap(),
            Observation::Advanced {
                pending_captured: true
            }
        );
        let pending = t.take_pending_snapshot().unwrap();
        assert_eq!(pending.position, at(1, 2));
        assert_eq!(t.watermark(), &at(2, 1));
        assert!(t.take_pending_snapshot().is_none());
    }

    #[test]
    fn leaving_seed_value_does_not_capture_pending() {
        let mut t = tracker(Some(1), true);
        t.observe(&2).unwrap();
        assert!(!t.has_pending());
        t.observe(&3).unwrap();
        assert_eq!(t.take_pending_snapshot().unwrap().position, at(2, 1));
    }

    #[test]
    fn newer_pending_supersedes_older() {
        let mut t = tracker(None, true);
        for v in [1, 2, 3, 3] {
            t.observe(&v).unwrap();
        }
        t.observe(&4).unwrap();
        assert_eq!(t.take_pending_snapshot().unwrap().position, at(3, 2));
    }

    #[test]
    fn disabled_checkpointing_never_captures() {
        let mut t = tracker(None, false);
        for v in [1, 2, 3] {
            t.observe(&v).unwrap();
        }
        assert!(!t.has_pending());
        assert_eq!(t.final_snapshot().position, at(3, 1));
    }

    #[test]
    fn out_of_order_is_reported_and_ignored() {
        let mut t = tracker(None, true);
        t.observe(&5).unwrap();
        let obs = t.observe(&3).unwrap();
        assert_eq!(
            obs,
            Observation::OutOfOrder(OutOfOrderCursor {
                value: CursorValue::int64(3),
                watermark: CursorValue::int64(5),
                record_number: 2,
            })
        );
        assert!(t.is_degraded());
        assert_eq!(t.watermark(), &at(5, 1));
        t.observe(&6).unwrap();
        assert_eq!(t.watermark(), &at(6, 1));
        assert_eq!(t.take_pending_snapshot().unwrap().position, at(5, 1));
    }

    #[test]
    fn missing_cursor_counts_but_does_not_move_watermark() {
        let mut t = CursorWatermarkTracker::new(
            StreamIdentity::new("orders"),
            CursorPosition::default(),
            CursorComparator::new(CursorType::Utf8),
            |_: &()| None,
            true,
        )
        .unwrap();
        assert_eq!(t.observe(&()).unwrap(), Observation::NoCursor);
        assert_eq!(t.total_records_seen(), 1);
        assert_eq!(t.final_snapshot().position, CursorPosition::default());
    }

    #[test]
    fn invalid_cursor_value_is_an_error() {
        let mut t = tracker(None, true);
        let err = t.observe_value(Some(CursorValue::utf8("abc"))).unwrap_err();
        assert!(matches!(err, CursorError::Parse { .. }));
        assert_eq!(t.total_records_seen(), 1);
    }

    #[test]
    fn invalid_seed_is_rejected() {
        let result = CursorWatermarkTracker::new(
            StreamIdentity::new("orders"),
            CursorPosition::new(Some(CursorValue::utf8("not a number")), 0),
            CursorComparator::new(CursorType::Int64),
            int_cursor as IntAccessor,
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn final_snapshot_discards_pending() {
        let mut t = tracker(None, true);
        for v in [1, 2] {
            t.observe(&v).unwrap();
        }
        assert!(t.has_pending());
        assert_eq!(t.final_snapshot().position, at(2, 1));
        assert!(!t.has_pending());
    }
}
