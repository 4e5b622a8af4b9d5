//! Public API module.
//!
//! This module contains the high-level user-facing API for the `cmrs` crate.

pub mod connectivity;
pub mod models;
pub mod overlay;
