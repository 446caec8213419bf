//! Property tests for checkpoint placement over random cursor sequences.

use std::sync::Arc;

use proptest::prelude::*;
use waypoint_engine::observer::NoopObserver;
use waypoint_engine::{CheckpointController, SyncItem};
use waypoint_state::{SqliteStateStore, StateStore};
use waypoint_types::checkpoint::{CheckpointMode, CheckpointPolicyConfig, CheckpointSnapshot};
use waypoint_types::cursor::{CursorPosition, CursorType, CursorValue};
use waypoint_types::state::PipelineId;
use waypoint_types::stream::StreamIdentity;

fn int_cursor(r: &i64) -> Option<CursorValue> {
    Some(CursorValue::int64(*r))
}

fn run(values: &[i64], config: &CheckpointPolicyConfig) -> Vec<SyncItem<i64>> {
    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::in_memory().unwrap());
    let controller = CheckpointController::new(
        StreamIdentity::new("prop"),
        CursorPosition::default(),
        CursorType::Int64,
        config,
        int_cursor as fn(&i64) -> Option<CursorValue>,
    )
    .unwrap();
    let records: Vec<Result<i64, std::io::Error>> = values.iter().copied().map(Ok).collect();
    let mut sequence = controller.into_sequence(
        records.into_iter(),
        store,
        PipelineId::new("prop"),
        Arc::new(NoopObserver),
    );
    let items: Vec<_> = sequence.by_ref().map(Result::unwrap).collect();
    assert!(sequence.next().is_none());
    items
}

fn checkpoint_value(c: &CheckpointSnapshot) -> Option<i64> {
    c.cursor_value.as_ref().and_then(CursorValue::as_int64)
}

fn policy_strategy() -> impl Strategy<Value = CheckpointPolicyConfig> {
    (0_u64..5, any::<bool>()).prop_map(|(every_records, eager)| CheckpointPolicyConfig {
        every_records,
        every: None,
        mode: if eager {
            CheckpointMode::Eager
        } else {
            CheckpointMode::Interval
        },
    })
}

proptest! {
    #[test]
    fn exactly_one_terminal_checkpoint(
        values in prop::collection::vec(0_i64..20, 0..60),
        config in policy_strategy(),
    ) {
        let items = run(&values, &config);
        let last = items.last().and_then(SyncItem::as_checkpoint);
        prop_assert!(last.is_some());

        let records: Vec<i64> = items
            .iter()
            .cloned()
            .filter_map(SyncItem::into_record)
            .collect();
        prop_assert_eq!(&records, &values);

        let covered: u64 = items
            .iter()
            .filter_map(SyncItem::as_checkpoint)
            .map(|c| c.records_since_last_checkpoint)
            .sum();
        prop_assert_eq!(covered, values.len() as u64);
    }

    #[test]
    fn checkpoints_never_look_ahead(
        values in prop::collection::vec(0_i64..20, 0..60),
        config in policy_strategy(),
    ) {
        let items = run(&values, &config);
        let mut yielded: Vec<i64> = Vec::new();
        for item in &items {
            match item {
                SyncItem::Record(r) => yielded.push(*r),
                SyncItem::Checkpoint(c) => {
                    if let Some(v) = checkpoint_value(c) {
                        let seen = yielded.iter().filter(|r| **r == v).count() as u64;
                        prop_assert!(
                            c.cursor_record_count <= seen,
                            "checkpoint {}x{} after only {} matching records",
                            v, c.cursor_record_count, seen
                        );
                    } else {
                        prop_assert_eq!(c.cursor_record_count, 0);
                    }
                }
            }
        }
    }

    #[test]
    fn sorted_input_checkpoints_cover_whole_value_groups(
        mut values in prop::collection::vec(0_i64..20, 1..60),
        config in policy_strategy(),
    ) {
        values.sort_unstable();
        let items = run(&values, &config);
        let mut watermark = i64::MIN;
        for item in &items {
            if let SyncItem::Checkpoint(c) = item {
                let v = checkpoint_value(c).unwrap();
                prop_assert!(v >= watermark, "checkpoint moved backwards");
                watermark = v;
                let group = values.iter().filter(|r| **r == v).count() as u64;
                let is_terminal = std::ptr::eq(item, items.last().unwrap());
                if !is_terminal {
                    prop_assert_eq!(c.cursor_record_count, group);
                }
            }
        }
        let last = items.last().and_then(SyncItem::as_checkpoint).unwrap();
        let max = *values.last().unwrap();
        prop_assert_eq!(checkpoint_value(last), Some(max));
        prop_assert_eq!(
            last.cursor_record_count,
            values.iter().filter(|r| **r == max).count() as u64
        );
    }

    #[test]
    fn disabled_policy_emits_only_terminal(values in prop::collection::vec(any::<i64>(), 0..100)) {
        let items = run(&values, &CheckpointPolicyConfig::default());
        let checkpoints = items.iter().filter(|i| i.as_checkpoint().is_some()).count();
        prop_assert_eq!(checkpoints, 1);
    }
}
