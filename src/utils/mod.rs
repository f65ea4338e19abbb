//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `alexbus` client.
//!
//! It centralizes the error taxonomy and the logging setup so every other
//! module reports failures and emits diagnostics the same way.

pub mod error;
pub mod logging;
