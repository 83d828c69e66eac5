//! Runs against a real, disposable PostgreSQL (the variable tables are wiped):
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{Duration, NaiveDateTime};

use plant_telemetry_jobs::db::{self, models::TelemetryRow, models::Variable, queries};
use plant_telemetry_jobs::services::sync::{PgReadingSink, ReadingSink};

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
}

fn rows(start: &str, count: i64) -> Vec<TelemetryRow> {
    (0..count)
        .map(|i| TelemetryRow {
            timestamp: ts(start) + Duration::hours(i),
            temperature: 20.0 + i as f64,
            humidity: 55.0 + i as f64,
        })
        .collect()
}

async fn count(pool: &sqlx::PgPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_failed_batch_leaves_no_partial_rows() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::connect(&url).await.unwrap();

    sqlx::query("DELETE FROM temperature").execute(&pool).await.unwrap();
    sqlx::query("DELETE FROM humidity").execute(&pool).await.unwrap();

    let mut sink = PgReadingSink::new(&pool);
    let first = rows("2024-01-01T00:00:00", 3);
    assert_eq!(sink.append_batch(&first).await.unwrap(), 3);

    // Make the humidity insert fail after the temperature insert went through.
    sqlx::query("ALTER TABLE humidity RENAME TO humidity_hidden")
        .execute(&pool)
        .await
        .unwrap();

    let second = rows("2024-01-01T03:00:00", 4);
    let result = sink.append_batch(&second).await;

    sqlx::query("ALTER TABLE humidity_hidden RENAME TO humidity")
        .execute(&pool)
        .await
        .unwrap();

    assert!(result.is_err());
    assert_eq!(count(&pool, "temperature").await, 3);
    assert_eq!(count(&pool, "humidity").await, 3);
    assert_eq!(
        queries::max_timestamp(&pool, Variable::Temperature)
            .await
            .unwrap(),
        Some(ts("2024-01-01T02:00:00"))
    );

    // Replaying the same batch after the failure lands it in both tables.
    assert_eq!(sink.append_batch(&second).await.unwrap(), 4);
    assert_eq!(count(&pool, "temperature").await, 7);
    assert_eq!(count(&pool, "humidity").await, 7);

    pool.close().await;
}
