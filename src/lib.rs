//! Grazing rotation planning: greedy forage allocation under biological and
//! operational limits, plus a day-by-day pasture simulation.

pub mod config;
pub mod datasources;
pub mod db;
pub mod error;
pub mod logic;
pub mod models;

pub use error::{PastureOpsError, Result};
