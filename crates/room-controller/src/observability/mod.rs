//! Observability module for Room Controller.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
