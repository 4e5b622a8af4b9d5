//! Type definitions and constants.
//!
//! This module contains the ConnMan and oFono bus names, property keys
//! and timeout defaults.

pub(crate) mod constants;
