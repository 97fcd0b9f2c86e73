pub mod ai;
pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod storage;
pub mod types;
