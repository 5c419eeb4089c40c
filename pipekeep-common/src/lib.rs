//! # Pipekeep Common Library
//!
//! Shared code for the pipekeep services including:
//! - Lead, owner and pipeline status models
//! - Database bootstrap and runtime settings
//! - Bootstrap configuration loading
//! - Clock abstraction used by every time-dependent computation

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use db::models::{Lead, Owner, OwnerRole, PipelineStatus, Touchpoint, UNASSIGNED_OWNER};
pub use db::settings::Thresholds;
pub use error::{Error, Result};
pub use time::{Clock, FixedClock, SystemClock};
