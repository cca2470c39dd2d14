//! Integration tests for `PostgresRecordStore` against a live Postgres.

use chronicle_postgres::{BindValue, PostgresRecordStore};
use sqlx::PgPool;

async fn store_with_table(pool: &PgPool) -> PostgresRecordStore {
    sqlx::query(
        "CREATE TABLE order_totals (no BIGSERIAL PRIMARY KEY, order_ref TEXT NOT NULL, total BIGINT NOT NULL)",
    )
    .execute(pool)
    .await
    .unwrap();

    PostgresRecordStore::new(pool.clone())
}

async fn totals(pool: &PgPool) -> Vec<(String, i64)> {
    sqlx::query_as("SELECT order_ref, total FROM order_totals ORDER BY no")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = false)]
async fn test_exists_probes_the_table(pool: PgPool) {
    let store = PostgresRecordStore::new(pool.clone());
    assert!(!store.exists("order_totals").await.unwrap());

    let store = store_with_table(&pool).await;
    assert!(store.exists("order_totals").await.unwrap());
}

#[sqlx::test(migrations = false)]
async fn test_insert_update_remove_round_trip(pool: PgPool) {
    let store = store_with_table(&pool).await;

    store
        .insert(
            "order_totals",
            &[
                ("order_ref", BindValue::from("ord-1")),
                ("total", BindValue::from(10_i64)),
            ],
        )
        .await
        .unwrap();
    store
        .insert(
            "order_totals",
            &[
                ("order_ref", BindValue::from("ord-2")),
                ("total", BindValue::from(20_i64)),
            ],
        )
        .await
        .unwrap();

    store
        .update(
            "order_totals",
            &[("total", BindValue::from(15_i64))],
            &[("order_ref", BindValue::from("ord-1"))],
        )
        .await
        .unwrap();

    assert_eq!(
        totals(&pool).await,
        vec![("ord-1".to_owned(), 15), ("ord-2".to_owned(), 20)]
    );

    store
        .remove("order_totals", &[("order_ref", BindValue::from("ord-1"))])
        .await
        .unwrap();

    assert_eq!(totals(&pool).await, vec![("ord-2".to_owned(), 20)]);
}

#[sqlx::test(migrations = false)]
async fn test_reset_truncates_and_restarts_identity(pool: PgPool) {
    let store = store_with_table(&pool).await;
    store
        .insert(
            "order_totals",
            &[
                ("order_ref", BindValue::from("ord-1")),
                ("total", BindValue::from(10_i64)),
            ],
        )
        .await
        .unwrap();

    store.reset("order_totals").await.unwrap();
    assert!(totals(&pool).await.is_empty());

    store
        .insert(
            "order_totals",
            &[
                ("order_ref", BindValue::from("ord-3")),
                ("total", BindValue::from(30_i64)),
            ],
        )
        .await
        .unwrap();

    let first_no: i64 = sqlx::query_scalar("SELECT no FROM order_totals")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(first_no, 1);
}

#[sqlx::test(migrations = false)]
async fn test_delete_table_drops_and_is_idempotent(pool: PgPool) {
    let store = store_with_table(&pool).await;

    store.delete_table("order_totals").await.unwrap();
    assert!(!store.exists("order_totals").await.unwrap());

    store.delete_table("order_totals").await.unwrap();
}

#[sqlx::test(migrations = false)]
async fn test_empty_column_lists_are_rejected(pool: PgPool) {
    let store = store_with_table(&pool).await;

    assert!(store.insert("order_totals", &[]).await.is_err());
    assert!(store.remove("order_totals", &[]).await.is_err());
    assert!(
        store
            .update(
                "order_totals",
                &[],
                &[("order_ref", BindValue::from("ord-1"))]
            )
            .await
            .is_err()
    );
}
