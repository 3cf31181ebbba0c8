//! Nexus Probe - configurable probing engine for authorized HTTP testing
//!
//! A run expands a target description into probe specs, dispatches them with
//! bounded concurrency and a global rate limit, classifies every response and
//! aggregates the outcome into a report.

pub mod app;
pub mod campaign;
pub mod classifier;
pub mod dispatch;
pub mod error;
pub mod probe;
pub mod reporting;
pub mod runner;

pub use error::*;
