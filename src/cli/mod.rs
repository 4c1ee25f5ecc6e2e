//! Command line for the bannerkit library
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, BannerCommand, Cli, CliLogFormat, CliPrecision, Command, PartnerCommand};
