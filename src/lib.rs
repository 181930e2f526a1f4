pub mod attachments;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod service;
pub mod telemetry;
pub mod upload;
pub mod utils;
