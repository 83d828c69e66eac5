// Plant telemetry load job: mirrors new CrateDB readings into PostgreSQL.
use std::process::ExitCode;

use plant_telemetry_jobs::config::AppConfig;
use plant_telemetry_jobs::{db, logging, services};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("load-job: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_tracing(config.log_format);

    let pool = match db::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Load job aborted: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = services::sync::run_sync(&pool, &config).await;
    pool.close().await;

    match result {
        Ok(outcome) => {
            tracing::info!(
                "Load job finished: {} rows inserted, watermark {:?} -> {:?}",
                outcome.rows_inserted,
                outcome.watermark_before,
                outcome.watermark_after
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Load job failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
