// Plant telemetry prediction job: forecasts the next 24 hours of
// temperature and humidity and records model accuracy.
use std::process::ExitCode;

use plant_telemetry_jobs::config::AppConfig;
use plant_telemetry_jobs::{db, logging, services};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("prediction-job: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_tracing(config.log_format);

    let pool = match db::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Prediction job aborted: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = services::prediction::run_prediction(&pool, &config).await;
    pool.close().await;

    match result {
        Ok(outcome) => {
            tracing::info!(
                "Prediction job finished: {} forecast rows, {} accuracy rows",
                outcome.predictions_written,
                outcome.accuracy_written
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Prediction job failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
