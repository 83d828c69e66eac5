//! Plant telemetry jobs: incremental sync of upstream readings into
//! PostgreSQL, and hourly temperature/humidity forecasting on top of them.

pub mod config;
pub mod db;
pub mod errors;
mod helpers;
pub mod logging;
pub mod services;
