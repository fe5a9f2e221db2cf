// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! CLI module.
//!
//! This module contains the command-line interface logic, including argument parsing,
//! user-facing output and the `predict` command implementation.

// Modules
/// CLI arguments.
pub mod args;

/// Colored terminal output and log setup.
pub mod logging;

/// Prediction logic.
pub mod predict;
