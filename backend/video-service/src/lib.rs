//! Video Service
//!
//! The secure video processing and delivery pipeline of the Coursa platform:
//! source ingest, adaptive-bitrate transcoding, artifact publishing, and
//! entitlement-gated playback.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
