//! pubharvest-common — Shared records, errors, config, and the guarded HTTP
//! client used across the pubharvest crates.

pub mod config;
pub mod error;
pub mod net;
pub mod records;

pub use config::Config;
pub use error::{HarvestError, Result};
