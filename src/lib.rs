#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod commands;
pub mod config;
pub mod devtools;
pub mod extend;
pub mod grid;
pub mod harvest;
pub mod ledger;
pub mod logging;
pub mod navigator;
pub mod page;
pub mod remote;
pub mod selection;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, Options};
