pub mod catalog;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod quote;
pub mod reconciler;
pub mod submission;

// Boundary ports and their infrastructure adapters
pub mod infra;
pub mod ports;
