//! Integration tests for `PostgresEventStore` against a live Postgres.

use std::sync::Arc;

use chronicle_core::error::StoreError;
use chronicle_core::matcher::{MetadataMatch, Operator};
use chronicle_core::registry::TypeRegistry;
use chronicle_postgres::{LoadStreamParameter, PostgresEventStore, stream_table_name};
use chronicle_test_support::{TestEvent, note_event, note_event_at, test_registry};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

fn registry() -> Arc<TypeRegistry<TestEvent>> {
    Arc::new(test_registry())
}

async fn installed(pool: &PgPool) -> PostgresEventStore {
    let store = PostgresEventStore::new(pool.clone());
    store.install().await.unwrap();
    store
}

async fn physical_table_exists(pool: &PgPool, stream_name: &str) -> bool {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_tables WHERE tablename = $1)")
        .bind(stream_table_name(stream_name))
        .fetch_one(pool)
        .await
        .unwrap()
}

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
}

fn body(event: &TestEvent) -> &str {
    let TestEvent::NoteAdded(note) = event;
    &note.body
}

// --- install ---

#[sqlx::test(migrations = false)]
async fn test_double_install_has_no_effect(pool: PgPool) {
    let store = installed(&pool).await;

    store.install().await.unwrap();
}

// --- stream lifecycle ---

#[sqlx::test(migrations = false)]
async fn test_create_stream_registers_and_creates_table(pool: PgPool) {
    let store = installed(&pool).await;

    store.create_stream("foo-stream").await.unwrap();

    assert!(store.has_stream("foo-stream").await.unwrap());
    assert!(physical_table_exists(&pool, "foo-stream").await);

    store.delete_stream("foo-stream").await.unwrap();

    assert!(!store.has_stream("foo-stream").await.unwrap());
    assert!(!physical_table_exists(&pool, "foo-stream").await);
}

#[sqlx::test(migrations = false)]
async fn test_duplicate_create_is_stream_already_exists(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("foo-stream").await.unwrap();

    let err = store.create_stream("foo-stream").await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::StreamAlreadyExists { stream } if stream == "foo-stream"
    ));
}

#[sqlx::test(migrations = false)]
async fn test_delete_unknown_stream_is_stream_not_found(pool: PgPool) {
    let store = installed(&pool).await;

    let err = store.delete_stream("missing").await.unwrap_err();

    assert!(matches!(err, StoreError::StreamNotFound { .. }));
}

#[sqlx::test(migrations = false)]
async fn test_stream_names_exclude_system_streams(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    store.create_stream("$internal").await.unwrap();

    let mut names = store.stream_names().await.unwrap();
    names.sort();

    assert_eq!(names, vec!["orders".to_owned()]);
}

// --- append + load ---

#[sqlx::test(migrations = false)]
async fn test_append_and_load_preserves_order(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();

    store
        .append_to(
            "orders",
            vec![
                note_event(aggregate_id, 1, "first"),
                note_event(aggregate_id, 2, "second"),
                note_event(aggregate_id, 3, "third"),
            ],
        )
        .await
        .unwrap();

    let mut iterator = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .unwrap();
    let events = iterator.drain_to_list().await.unwrap();

    assert_eq!(events.len(), 3);
    for (index, event) in events.iter().enumerate() {
        assert_eq!(event.no, i64::try_from(index).unwrap() + 1);
        assert_eq!(event.stream, "orders");
    }
    let bodies: Vec<&str> = events.iter().map(|e| body(&e.payload)).collect();
    assert_eq!(bodies, vec!["first", "second", "third"]);
}

#[sqlx::test(migrations = false)]
async fn test_load_from_number_skips_earlier_events(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();
    store
        .append_to(
            "orders",
            vec![
                note_event(aggregate_id, 1, "first"),
                note_event(aggregate_id, 2, "second"),
                note_event(aggregate_id, 3, "third"),
            ],
        )
        .await
        .unwrap();

    let mut iterator = store
        .load(registry(), "orders", 2, None, &Vec::new())
        .await
        .unwrap();
    let events = iterator.drain_to_list().await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].no, 2);
    assert_eq!(events[1].no, 3);
}

#[sqlx::test(migrations = false)]
async fn test_append_empty_batch_is_noop(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();

    store.append_to("orders", Vec::new()).await.unwrap();

    let mut iterator = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .unwrap();
    assert!(iterator.is_empty().await.unwrap());
}

#[sqlx::test(migrations = false)]
async fn test_load_unknown_stream_is_stream_not_found(pool: PgPool) {
    let store = installed(&pool).await;

    let err = store
        .load(registry(), "bar-stream", 1, None, &Vec::new())
        .await
        .map(|_| ())
        .unwrap_err();

    assert!(matches!(err, StoreError::StreamNotFound { .. }));
}

#[sqlx::test(migrations = false)]
async fn test_delete_then_load_is_stream_not_found(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();
    store
        .append_to(
            "orders",
            vec![
                note_event(aggregate_id, 1, "a"),
                note_event(aggregate_id, 2, "b"),
                note_event(aggregate_id, 3, "c"),
            ],
        )
        .await
        .unwrap();

    let mut iterator = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .unwrap();
    assert_eq!(iterator.drain_to_list().await.unwrap().len(), 3);

    store.delete_stream("orders").await.unwrap();

    let err = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, StoreError::StreamNotFound { .. }));
}

// --- optimistic concurrency ---

#[sqlx::test(migrations = false)]
async fn test_duplicate_aggregate_version_is_concurrency_conflict(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();

    store
        .append_to("orders", vec![note_event(aggregate_id, 1, "first")])
        .await
        .unwrap();

    let err = store
        .append_to("orders", vec![note_event(aggregate_id, 1, "competing")])
        .await
        .unwrap_err();
    assert!(err.is_concurrency_conflict());

    // The first committed event is untouched.
    let mut iterator = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .unwrap();
    let events = iterator.drain_to_list().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(body(&events[0].payload), "first");
}

#[sqlx::test(migrations = false)]
async fn test_failed_batch_rolls_back_entirely(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();
    store
        .append_to("orders", vec![note_event(aggregate_id, 1, "first")])
        .await
        .unwrap();

    // Second event of the batch collides on version 1: the valid first
    // event of the batch must not survive either.
    let err = store
        .append_to(
            "orders",
            vec![
                note_event(aggregate_id, 2, "valid"),
                note_event(aggregate_id, 1, "colliding"),
            ],
        )
        .await
        .unwrap_err();
    assert!(err.is_concurrency_conflict());

    let mut iterator = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .unwrap();
    let events = iterator.drain_to_list().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(body(&events[0].payload), "first");
}

// --- empty streams ---

#[sqlx::test(migrations = false)]
async fn test_empty_stream_iterator(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();

    let mut iterator = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .unwrap();

    assert!(iterator.is_empty().await.unwrap());
    assert!(iterator.drain_to_list().await.unwrap().is_empty());
}

// --- iterator behavior ---

#[sqlx::test(migrations = false)]
async fn test_current_positions_lazily(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();
    store
        .append_to(
            "orders",
            vec![
                note_event(aggregate_id, 1, "first"),
                note_event(aggregate_id, 2, "second"),
            ],
        )
        .await
        .unwrap();

    let mut iterator = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .unwrap();

    assert!(!iterator.is_empty().await.unwrap());
    let first = iterator.current().await.unwrap().unwrap();
    assert_eq!(body(&first.payload), "first");

    assert!(iterator.advance().await);
    let second = iterator.current().await.unwrap().unwrap();
    assert_eq!(body(&second.payload), "second");

    assert!(!iterator.advance().await);
}

#[sqlx::test(migrations = false)]
async fn test_restart_replays_buffered_events_without_requerying(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();
    store
        .append_to(
            "orders",
            vec![
                note_event(aggregate_id, 1, "first"),
                note_event(aggregate_id, 2, "second"),
            ],
        )
        .await
        .unwrap();

    let mut iterator = store
        .load(registry(), "orders", 1, None, &Vec::new())
        .await
        .unwrap();
    let first_pass = iterator.drain_to_list().await.unwrap();

    // New events appended after the buffer was fetched must not appear
    // on replay: restart rewinds, it does not re-query.
    store
        .append_to("orders", vec![note_event(aggregate_id, 3, "third")])
        .await
        .unwrap();

    iterator.restart();
    let second_pass = iterator.drain_to_list().await.unwrap();

    assert_eq!(first_pass.len(), 2);
    assert_eq!(second_pass.len(), 2);
    assert_eq!(
        first_pass.iter().map(|e| e.no).collect::<Vec<_>>(),
        second_pass.iter().map(|e| e.no).collect::<Vec<_>>()
    );
}

#[sqlx::test(migrations = false)]
async fn test_count_limit_bounds_the_read(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();
    store
        .append_to(
            "orders",
            vec![
                note_event(aggregate_id, 1, "a"),
                note_event(aggregate_id, 2, "b"),
                note_event(aggregate_id, 3, "c"),
            ],
        )
        .await
        .unwrap();

    let mut iterator = store
        .load(registry(), "orders", 1, Some(2), &Vec::new())
        .await
        .unwrap();
    let events = iterator.drain_to_list().await.unwrap();

    assert_eq!(events.len(), 2);
}

#[sqlx::test(migrations = false)]
async fn test_unregistered_event_name_surfaces_decode_failed(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();
    store
        .append_to("orders", vec![note_event(aggregate_id, 1, "first")])
        .await
        .unwrap();

    let empty_registry = Arc::new(TypeRegistry::<TestEvent>::new());
    let mut iterator = store
        .load(empty_registry, "orders", 1, None, &Vec::new())
        .await
        .unwrap();

    let err = iterator.drain_to_list().await.unwrap_err();
    assert!(matches!(err, StoreError::DecodeFailed { .. }));
    assert!(iterator.error().is_some());
}

// --- metadata matcher ---

#[sqlx::test(migrations = false)]
async fn test_integer_and_boolean_matcher(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("orders").await.unwrap();
    let aggregate_id = Uuid::new_v4();

    store
        .append_to(
            "orders",
            vec![
                note_event(aggregate_id, 1, "kept")
                    .with_added_metadata("attempt", 2_i64)
                    .with_added_metadata("flag", true),
                note_event(aggregate_id, 2, "filtered")
                    .with_added_metadata("attempt", 3_i64)
                    .with_added_metadata("flag", true),
            ],
        )
        .await
        .unwrap();

    let matcher = vec![
        MetadataMatch::metadata("attempt", Operator::LowerThanEquals, 2_i64),
        MetadataMatch::metadata("flag", Operator::Equals, true),
    ];
    let mut iterator = store
        .load(registry(), "orders", 0, None, &matcher)
        .await
        .unwrap();
    let events = iterator.drain_to_list().await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(body(&events[0].payload), "kept");
}

// --- multi-stream merge ---

#[sqlx::test(migrations = false)]
async fn test_merge_interleaves_by_wall_clock(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("foo-stream").await.unwrap();
    store.create_stream("bar-stream").await.unwrap();
    let foo_aggregate = Uuid::new_v4();
    let bar_aggregate = Uuid::new_v4();

    store
        .append_to(
            "foo-stream",
            vec![note_event_at(foo_aggregate, 1, "t1", at(1))],
        )
        .await
        .unwrap();
    store
        .append_to(
            "bar-stream",
            vec![note_event_at(bar_aggregate, 1, "t2", at(2))],
        )
        .await
        .unwrap();
    store
        .append_to(
            "foo-stream",
            vec![note_event_at(foo_aggregate, 2, "t3", at(3))],
        )
        .await
        .unwrap();

    let mut iterator = store
        .merge_and_load(
            registry(),
            None,
            &[
                LoadStreamParameter::new("foo-stream", 1),
                LoadStreamParameter::new("bar-stream", 1),
            ],
        )
        .await
        .unwrap();
    let events = iterator.drain_to_list().await.unwrap();

    let bodies: Vec<&str> = events.iter().map(|e| body(&e.payload)).collect();
    assert_eq!(bodies, vec!["t1", "t2", "t3"]);
    let streams: Vec<&str> = events.iter().map(|e| e.stream.as_str()).collect();
    assert_eq!(streams, vec!["foo-stream", "bar-stream", "foo-stream"]);
}

#[sqlx::test(migrations = false)]
async fn test_merge_with_unknown_stream_aborts_before_reading(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("foo-stream").await.unwrap();

    let err = store
        .merge_and_load(
            registry(),
            None,
            &[
                LoadStreamParameter::new("foo-stream", 1),
                LoadStreamParameter::new("missing", 1),
            ],
        )
        .await
        .map(|_| ())
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::StreamNotFound { stream } if stream == "missing"
    ));
}

#[sqlx::test(migrations = false)]
async fn test_merge_with_per_stream_matchers_numbers_parameters_disjointly(pool: PgPool) {
    let store = installed(&pool).await;
    store.create_stream("foo-stream").await.unwrap();
    store.create_stream("bar-stream").await.unwrap();
    let foo_aggregate = Uuid::new_v4();
    let bar_aggregate = Uuid::new_v4();

    store
        .append_to(
            "foo-stream",
            vec![
                note_event_at(foo_aggregate, 1, "foo-kept", at(1))
                    .with_added_metadata("actor", "alice"),
                note_event_at(foo_aggregate, 2, "foo-dropped", at(2))
                    .with_added_metadata("actor", "bob"),
            ],
        )
        .await
        .unwrap();
    store
        .append_to(
            "bar-stream",
            vec![
                note_event_at(bar_aggregate, 1, "bar-kept", at(3))
                    .with_added_metadata("actor", "carol"),
            ],
        )
        .await
        .unwrap();

    let mut iterator = store
        .merge_and_load(
            registry(),
            None,
            &[
                LoadStreamParameter::new("foo-stream", 1).with_matcher(vec![
                    MetadataMatch::metadata("actor", Operator::Equals, "alice"),
                ]),
                LoadStreamParameter::new("bar-stream", 1).with_matcher(vec![
                    MetadataMatch::metadata("actor", Operator::Equals, "carol"),
                ]),
            ],
        )
        .await
        .unwrap();
    let events = iterator.drain_to_list().await.unwrap();

    let bodies: Vec<&str> = events.iter().map(|e| body(&e.payload)).collect();
    assert_eq!(bodies, vec!["foo-kept", "bar-kept"]);
}
