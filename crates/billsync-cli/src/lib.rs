//! Billsync CLI - command-line interface for the billing report sync
//!
//! This crate provides the CLI application that ties the mapping engine and
//! the Dataverse client together.

pub mod config;
pub mod report;

pub use config::{Command, Config};
pub use report::ReportCache;
