pub mod config;
pub mod envelope;
pub mod error;
pub mod models;
pub mod session;
