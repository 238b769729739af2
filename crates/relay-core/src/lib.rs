//! Core domain + application logic for the Telegram completion relay.
//!
//! This crate is intentionally framework-agnostic. The completion API, the
//! Telegram Bot API and the HTTP server live behind ports (traits) implemented
//! in adapter crates.

pub mod clock;
pub mod commands;
pub mod completion;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod quota;
pub mod relay;
pub mod state;
pub mod store;

pub use errors::{Error, Result};
