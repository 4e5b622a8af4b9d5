//! Live tracking of ConnMan services and oFono modems.
//!
//! The engine subscribes to daemon signals and keeps the registries current;
//! the change monitor turns its snapshot channel into callbacks.

pub(crate) mod changes;
pub(crate) mod engine;
