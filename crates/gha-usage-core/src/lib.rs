//! Core library for gha-usage.
//!
//! Scans a GitHub organization for the billable Actions time of every
//! recently active repository and keeps the latest result in a shared
//! snapshot store refreshed on a fixed period.

pub mod clock;
pub mod config;
pub mod github;
pub mod monitor;
pub mod state;
pub mod usage;
