//! Locates the most recent captures in a day/night, hour-bucketed image archive.
//! This crate is consumed by the `skyfeed` CLI.

pub mod aggregator;
pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod scanner;

pub use crate::aggregator::{DEFAULT_KEEP_COUNT, ImageAggregator};
pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::models::*;
pub use crate::scanner::DirectoryScanner;
