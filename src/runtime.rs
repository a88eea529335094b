//! Runtime glue: configuration, the status reporter, shutdown handling, telemetry, and the
//! runner that ties a worker's lifetime together.

pub mod config;
pub mod runner;
pub mod shutdown;
pub mod status;
pub mod telemetry;
