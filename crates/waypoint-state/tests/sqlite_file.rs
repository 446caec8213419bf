use waypoint_state::prelude::*;

#[test]
fn checkpoint_survives_reopen() {
    let temp = tempfile::tempdir().expect("must create tempdir for sqlite state");
    let path = temp.path().join("nested").join("state.db");
    let pipeline = PipelineId::new("orders_sync");
    let stream = StreamIdentity::new("orders").with_namespace("public");

    {
        let store = SqliteStateStore::open(&path).expect("open must create parent dirs");
        store
            .persist_and_snapshot(
                &pipeline,
                &stream,
                &CursorPosition::new(Some(CursorValue::int64(41)), 1),
                100,
            )
            .unwrap();
        store
            .persist_and_snapshot(
                &pipeline,
                &stream,
                &CursorPosition::new(Some(CursorValue::int64(42)), 3),
                50,
            )
            .unwrap();
    }

    let reopened = SqliteStateStore::open(&path).expect("reopen must succeed");
    let cursor = reopened
        .load_cursor(&pipeline, &stream)
        .unwrap()
        .expect("cursor must be persisted");
    assert_eq!(
        cursor.position,
        CursorPosition::new(Some(CursorValue::int64(42)), 3)
    );
    assert_eq!(cursor.checkpoint_id, 2);

    let next = reopened
        .persist_and_snapshot(&pipeline, &stream, &cursor.position, 0)
        .unwrap();
    assert_eq!(next.id, 3);
}

#[test]
fn store_is_shareable_across_threads() {
    let store = std::sync::Arc::new(SqliteStateStore::in_memory().unwrap());
    let pipeline = PipelineId::new("p");

    std::thread::scope(|scope| {
        for i in 0..4_i64 {
            let store = store.clone();
            let pipeline = pipeline.clone();
            scope.spawn(move || {
                let stream = StreamIdentity::new(format!("stream_{i}"));
                for v in 0..10 {
                    store
                        .persist_and_snapshot(
                            &pipeline,
                            &stream,
                            &CursorPosition::new(Some(CursorValue::int64(v)), 1),
                            1,
                        )
                        .unwrap();
                }
            });
        }
    });

    for i in 0..4 {
        let cursor = store
            .load_cursor(&pipeline, &StreamIdentity::new(format!("stream_{i}")))
            .unwrap()
            .unwrap();
        assert_eq!(cursor.checkpoint_id, 10);
        assert_eq!(cursor.position.value, Some(CursorValue::int64(9)));
    }
}
