pub mod config;
pub mod coordinator;
pub mod errors;
pub mod metrics;
pub mod prompt;
pub mod record;
pub mod report;
pub mod session;
pub mod sink;
pub mod utils;
pub mod worker;
