pub mod evaluate;
pub mod forecaster;
pub mod forest;
pub mod prediction;
pub mod publish;
pub mod resample;
pub mod sync;
pub mod telemetry;
