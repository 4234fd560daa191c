//! Core domain + application logic for the n8n operator bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the process runner
//! live behind ports (traits) implemented in adapter crates.

pub mod archive;
pub mod backup;
pub mod command;
pub mod config;
pub mod db_backup;
pub mod dispatcher;
pub mod docker;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod pipeline;
pub mod ports;
pub mod report;
pub mod security;
pub mod update;
pub mod utils;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
