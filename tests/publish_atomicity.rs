//! Runs against a real PostgreSQL:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{Duration, NaiveDateTime};

use plant_telemetry_jobs::db::{self, models::AccuracyRecord, models::ForecastRecord, queries};
use plant_telemetry_jobs::services::publish::publish;

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
}

fn forecast(start: &str, temperature: f64) -> Vec<ForecastRecord> {
    (0..24)
        .map(|i| ForecastRecord {
            hour: ts(start) + Duration::hours(i),
            predicted_temperature: temperature,
            predicted_humidity: 60.0,
        })
        .collect()
}

fn accuracy(at: &str) -> Vec<AccuracyRecord> {
    vec![AccuracyRecord {
        model: "RandomForestRegressor-temperature".to_string(),
        mae: Some(0.5),
        mape: None,
        mse: Some(0.25),
        rmse: Some(0.5),
        timestamp: ts(at),
    }]
}

#[tokio::test]
#[ignore]
async fn test_failed_publish_keeps_previous_forecast() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::connect(&url).await.unwrap();

    let first = forecast("2024-01-02T00:00:00", 20.0);
    publish(&pool, Some(first.as_slice()), &accuracy("2024-01-01T23:30:00"))
        .await
        .unwrap();
    assert_eq!(queries::list_predictions(&pool).await.unwrap(), first);

    // Make the accuracy insert fail after the prediction table has been cleared.
    sqlx::query("ALTER TABLE model_accuracy RENAME TO model_accuracy_hidden")
        .execute(&pool)
        .await
        .unwrap();

    let second = forecast("2024-01-03T00:00:00", 25.0);
    let result = publish(
        &pool,
        Some(second.as_slice()),
        &accuracy("2024-01-02T23:30:00"),
    )
    .await;

    sqlx::query("ALTER TABLE model_accuracy_hidden RENAME TO model_accuracy")
        .execute(&pool)
        .await
        .unwrap();

    assert!(result.is_err());
    assert_eq!(queries::list_predictions(&pool).await.unwrap(), first);

    publish(&pool, Some(second.as_slice()), &accuracy("2024-01-02T23:30:00"))
        .await
        .unwrap();
    assert_eq!(queries::list_predictions(&pool).await.unwrap(), second);

    // Accuracy-only publish keeps the current forecast.
    let outcome = publish(&pool, None, &accuracy("2024-01-03T23:30:00"))
        .await
        .unwrap();
    assert!(!outcome.replaced_predictions);
    assert_eq!(outcome.accuracy_written, 1);
    assert_eq!(queries::list_predictions(&pool).await.unwrap(), second);

    pool.close().await;
}
