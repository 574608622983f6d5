//! Data Plane Services Module
//!
//! AWS data plane integrations: services that read data out of AWS
//! resources rather than managing the resources themselves.
//!
//! ## Available Services
//!
//! - **CloudWatch Logs**: Tail or replay the events of a log group

pub mod cloudwatch_logs;

pub use cloudwatch_logs::{CloudWatchLogsClient, LogEvent, TailController, TailSession};
