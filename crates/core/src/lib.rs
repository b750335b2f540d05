//! Policy Pro core library.
//!
//! Shared by every other crate in the workspace:
//! - Error taxonomy (`AppError`, `AppResult`)
//! - Layered configuration (`AppConfig`)
//! - Tracing setup

pub mod config;
pub mod error;
pub mod logging;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
