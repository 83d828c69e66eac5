use chrono::NaiveDateTime;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use super::models::{AccuracyRecord, ForecastRecord, HourlyAverage, TelemetryRow, Variable};

/// Latest timestamp already mirrored into a variable's table (NULL when empty).
pub async fn max_timestamp(
    pool: &PgPool,
    variable: Variable,
) -> Result<Option<NaiveDateTime>, sqlx::Error> {
    let sql = format!("SELECT MAX(timestamp) FROM {}", variable.table());
    sqlx::query_scalar::<_, Option<NaiveDateTime>>(&sql)
        .fetch_one(pool)
        .await
}

/// Insert one reading per row into a variable's table.
///
/// Runs on the caller's connection so it can take part in the sync
/// transaction. Returns the number of rows written.
pub async fn insert_readings(
    conn: &mut PgConnection,
    variable: Variable,
    rows: &[TelemetryRow],
) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} (value, timestamp) ", variable.table()));
    builder.push_values(rows, |mut b, row| {
        let value = match variable {
            Variable::Temperature => row.temperature,
            Variable::Humidity => row.humidity,
        };
        b.push_bind(value).push_bind(row.timestamp);
    });

    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// Hourly means of a variable, ordered by hour.
pub async fn hourly_averages(
    pool: &PgPool,
    variable: Variable,
) -> Result<Vec<HourlyAverage>, sqlx::Error> {
    let sql = format!(
        "SELECT date_trunc('hour', timestamp) AS hour, AVG(value) AS avg_value
         FROM {}
         GROUP BY hour
         ORDER BY hour",
        variable.table()
    );
    sqlx::query_as::<_, HourlyAverage>(&sql).fetch_all(pool).await
}

/// Remove every row of the current forecast.
///
/// Uses DELETE rather than TRUNCATE so dashboard readers keep seeing the
/// previous forecast until the publishing transaction commits.
pub async fn clear_predictions(conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM prediction").execute(conn).await?;
    Ok(result.rows_affected())
}

/// Insert forecast rows.
pub async fn insert_predictions(
    conn: &mut PgConnection,
    rows: &[ForecastRecord],
) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO prediction (temperature, humidity, timestamp) ");
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.predicted_temperature)
            .push_bind(row.predicted_humidity)
            .push_bind(row.hour);
    });

    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// Append accuracy records.
pub async fn insert_accuracy(
    conn: &mut PgConnection,
    records: &[AccuracyRecord],
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO model_accuracy (model, mae, mape, mse, rmse, timestamp) ",
    );
    builder.push_values(records, |mut b, rec| {
        b.push_bind(&rec.model)
            .push_bind(rec.mae)
            .push_bind(rec.mape)
            .push_bind(rec.mse)
            .push_bind(rec.rmse)
            .push_bind(rec.timestamp);
    });

    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// Current forecast rows, ordered by hour.
pub async fn list_predictions(pool: &PgPool) -> Result<Vec<ForecastRecord>, sqlx::Error> {
    sqlx::query_as::<_, ForecastRecord>(
        "SELECT timestamp, temperature, humidity FROM prediction ORDER BY timestamp",
    )
    .fetch_all(pool)
    .await
}
