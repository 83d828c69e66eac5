//! Upstream telemetry source.
//!
//! Readings live in CrateDB, queried over its HTTP `_sql` endpoint.
//! See: https://cratedb.com/docs/crate/reference/en/latest/interfaces/http.html

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::models::TelemetryRow;
use crate::errors::{AppError, Store};

const SELECT_SINCE_QUERY: &str = "select telemetry since watermark";

/// Anything that can hand out telemetry rows newer than a watermark.
#[allow(async_fn_in_trait)]
pub trait TelemetrySource {
    /// Rows with an event time strictly greater than `watermark` (all rows
    /// when `None`), oldest first, at most `limit` of them.
    async fn fetch_since(
        &self,
        watermark: Option<NaiveDateTime>,
        limit: i64,
    ) -> Result<Vec<TelemetryRow>, AppError>;
}

/// Client for the CrateDB `_sql` endpoint, scoped to one monitored entity.
#[derive(Debug, Clone)]
pub struct CrateClient {
    client: reqwest::Client,
    sql_url: String,
    table: String,
    entity_id: String,
}

#[derive(Debug, Serialize)]
struct SqlRequest<'a> {
    stmt: &'a str,
    args: (&'a str, i64, i64),
}

/// `time_index`, `temp`, `humedad` in select order.
type RawRow = (Option<i64>, Option<f64>, Option<f64>);

#[derive(Debug, Deserialize)]
struct SqlResponse {
    rows: Vec<RawRow>,
}

#[derive(Debug, Deserialize)]
struct SqlErrorResponse {
    error: SqlErrorBody,
}

#[derive(Debug, Deserialize)]
struct SqlErrorBody {
    message: String,
}

impl CrateClient {
    pub fn new(base_url: &str, table: &str, entity_id: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Connectivity {
                store: Store::Telemetry,
                source: Box::new(e),
            })?;
        Ok(Self {
            client,
            sql_url: format!("{}/_sql", base_url.trim_end_matches('/')),
            table: table.to_string(),
            entity_id: entity_id.to_string(),
        })
    }

    fn statement(&self) -> String {
        format!(
            "SELECT time_index, temp, humedad FROM {} \
             WHERE entity_id = ? AND time_index > ? \
             ORDER BY time_index LIMIT ?",
            self.table
        )
    }
}

impl TelemetrySource for CrateClient {
    async fn fetch_since(
        &self,
        watermark: Option<NaiveDateTime>,
        limit: i64,
    ) -> Result<Vec<TelemetryRow>, AppError> {
        let stmt = self.statement();
        // No watermark yet: pull from the very beginning.
        let since_millis = watermark.map(to_epoch_millis).unwrap_or(i64::MIN);
        let body = SqlRequest {
            stmt: &stmt,
            args: (&self.entity_id, since_millis, limit),
        };

        let response = self
            .client
            .post(&self.sql_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Connectivity {
                store: Store::Telemetry,
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<SqlErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "no error body".to_string());
            return Err(AppError::Query {
                store: Store::Telemetry,
                query: SELECT_SINCE_QUERY,
                source: format!("HTTP {}: {}", status, detail).into(),
            });
        }

        let payload: SqlResponse = response.json().await.map_err(|e| {
            AppError::Source(format!("CrateDB response could not be decoded: {}", e))
        })?;

        Ok(convert_rows(payload.rows))
    }
}

/// Convert raw source rows, dropping any that lack a timestamp or either value.
fn convert_rows(rows: Vec<RawRow>) -> Vec<TelemetryRow> {
    let total = rows.len();
    let converted: Vec<TelemetryRow> = rows
        .into_iter()
        .filter_map(|(time_index, temp, humidity)| {
            let timestamp = from_epoch_millis(time_index?)?;
            Some(TelemetryRow {
                timestamp,
                temperature: temp?,
                humidity: humidity?,
            })
        })
        .collect();

    if converted.len() < total {
        tracing::warn!(
            "Skipped {} incomplete telemetry rows (missing timestamp, temperature or humidity)",
            total - converted.len()
        );
    }
    converted
}

/// Millisecond epoch timestamp to the relational store's naive timestamp.
pub fn from_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Inverse of `from_epoch_millis`, used to pass the watermark upstream.
pub fn to_epoch_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn test_epoch_millis_conversion() {
        // 2024-01-01T00:00:00Z
        let t = from_epoch_millis(1_704_067_200_000).unwrap();
        assert_eq!(t, ts("2024-01-01T00:00:00"));
        assert_eq!(to_epoch_millis(t), 1_704_067_200_000);
    }

    #[test]
    fn test_epoch_millis_keeps_sub_second_precision() {
        let t = from_epoch_millis(1_704_067_200_123).unwrap();
        assert_eq!(to_epoch_millis(t), 1_704_067_200_123);
    }

    #[test]
    fn test_convert_rows_skips_incomplete() {
        let rows = vec![
            (Some(1_704_067_200_000), Some(20.0), Some(55.0)),
            (Some(1_704_067_260_000), None, Some(56.0)),
            (None, Some(21.0), Some(57.0)),
            (Some(1_704_067_380_000), Some(22.0), Some(58.0)),
        ];
        let converted = convert_rows(rows);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].temperature, 20.0);
        assert_eq!(converted[1].humidity, 58.0);
    }

    #[tokio::test]
    async fn test_fetch_since_sends_watermark_and_parses_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_sql"))
            .and(body_partial_json(serde_json::json!({
                "args": ["Joselito", 1_704_067_200_000_i64, 500]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cols": ["time_index", "temp", "humedad"],
                "rows": [
                    [1_704_070_800_000_i64, 21.5, 60.0],
                    [1_704_074_400_000_i64, 22.0, 61.5]
                ],
                "rowcount": 2,
                "duration": 1.2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CrateClient::new(&server.uri(), "doc.etvariables", "Joselito").unwrap();
        let rows = client
            .fetch_since(Some(ts("2024-01-01T00:00:00")), 500)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, ts("2024-01-01T01:00:00"));
        assert_eq!(rows[0].temperature, 21.5);
        assert_eq!(rows[1].humidity, 61.5);
    }

    #[tokio::test]
    async fn test_fetch_since_without_watermark_uses_lowest_bound() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_sql"))
            .and(body_partial_json(serde_json::json!({
                "args": ["Joselito", i64::MIN, 10]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cols": ["time_index", "temp", "humedad"],
                "rows": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CrateClient::new(&server.uri(), "doc.etvariables", "Joselito").unwrap();
        let rows = client.fetch_since(None, 10).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_since_reports_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_sql"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "message": "RelationUnknown[Relation 'doc.etvariables' unknown]", "code": 4041 }
            })))
            .mount(&server)
            .await;

        let client = CrateClient::new(&server.uri(), "doc.etvariables", "Joselito").unwrap();
        let err = client.fetch_since(None, 10).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Query {
                store: Store::Telemetry,
                ..
            }
        ));
        assert!(err.to_string().contains("RelationUnknown"), "{}", err);
    }

    #[tokio::test]
    async fn test_fetch_since_unreachable_is_connectivity_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let client = CrateClient::new("http://127.0.0.1:9", "doc.etvariables", "Joselito").unwrap();
        let err = client.fetch_since(None, 10).await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
