//! Core synchronisation logic.
//!
//! The registries and state machines here are plain data structures with no
//! I/O; the engine in [`crate::monitoring`] feeds them bus events and carries
//! out the follow-up calls they ask for.

pub(crate) mod cellular;
pub(crate) mod modem_registry;
pub(crate) mod pin;
pub(crate) mod service_mutator;
pub(crate) mod service_registry;
