//! Gantry Core - Core library for the Gantry task runner
//!
//! This crate provides the error and reporting framework, layered
//! configuration, and exit-time cleanup shared by the other Gantry crates.

pub mod config;
pub mod error;
pub mod exit;

pub use config::Config;
pub use error::{
    catch, handle_errors, ConfigError, GantryError, Result, ResultExt, TracedError,
};
pub use exit::ExitHooks;
