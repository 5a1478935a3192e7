pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod netlist;
pub mod output;
pub mod runner;
pub mod units;

pub use error::{Error, Result};
