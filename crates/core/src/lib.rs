//! Core types and utilities for the price oracle
//!
//! This crate provides shared types used across all components:
//! - Token pair, source and network definitions
//! - Quote and aggregated quote types
//! - Fixed-point price helpers
//! - Constant-product pool math
//! - Oracle configuration and error types

pub mod types;
pub mod fixed;
pub mod pools;
pub mod quotes;
pub mod config;
pub mod errors;

pub use types::*;
pub use fixed::*;
pub use pools::*;
pub use quotes::*;
pub use config::*;
pub use errors::*;
