//! Property test: whatever the two sides start with, one session makes
//! the destination equal the source.

use driftsync_adapter::MemoryDatabase;
use driftsync_codec::PackedValue;
use driftsync_engine::pipe::pipe;
use driftsync_engine::{DestOptions, DestWorker, SourceWorker};
use driftsync_schema::{Column, ColumnType, Table};
use proptest::prelude::*;

fn table_t() -> Table {
    Table {
        name: "t".into(),
        columns: vec![
            Column::new("id", ColumnType::SignedInt, false).with_size(8),
            Column::new("v", ColumnType::Text, true),
        ],
        primary_key_columns: vec![0],
        keys: vec![],
        where_conditions: None,
    }
}

fn seed(rows: &[(i64, Option<String>)]) -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.create_table(table_t());
    for (id, v) in rows {
        db.insert(
            "t",
            vec![
                PackedValue::Int(*id),
                v.as_deref().map(PackedValue::from).unwrap_or(PackedValue::Nil),
            ],
        );
    }
    db
}

fn run_session(source: &MemoryDatabase, dest: &MemoryDatabase) {
    let (commands_w, commands_r) = pipe();
    let (responses_w, responses_r) = pipe();

    let source_adapter = source.connect();
    let source_thread = std::thread::spawn(move || {
        SourceWorker::new(source_adapter, commands_r, responses_w).run()
    });

    DestWorker::new(dest.connect(), DestOptions::new(), responses_r, commands_w)
        .run()
        .expect("destination session failed");
    source_thread
        .join()
        .expect("source worker panicked")
        .expect("source session failed");
}

fn rows_strategy() -> impl Strategy<Value = Vec<(i64, Option<String>)>> {
    prop::collection::btree_map(0i64..64, prop::option::of("[a-e]{0,3}"), 0..48)
        .prop_map(|rows| rows.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn destination_always_converges(
        source_rows in rows_strategy(),
        dest_rows in rows_strategy(),
    ) {
        let source = seed(&source_rows);
        let dest = seed(&dest_rows);

        run_session(&source, &dest);
        prop_assert_eq!(source.rows("t"), dest.rows("t"));
    }

    #[test]
    fn converged_sessions_are_idempotent(
        source_rows in rows_strategy(),
        dest_rows in rows_strategy(),
    ) {
        let source = seed(&source_rows);
        let dest = seed(&dest_rows);

        run_session(&source, &dest);
        let after_first = dest.rows("t");
        run_session(&source, &dest);
        prop_assert_eq!(after_first, dest.rows("t"));
    }
}
