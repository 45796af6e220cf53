pub mod cli;
pub mod config;
pub mod query;
pub mod telemetry;
pub mod watch;
