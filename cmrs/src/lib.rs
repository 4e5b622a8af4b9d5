//! A Rust library that keeps ConnMan services and oFono modems in sync over D-Bus.
//!
//! The crate mirrors the state of two Linux connectivity daemons in memory
//! and lets you act on it:
//!
//! - Tracking every ConnMan service in the Manager's order
//! - Connecting, disconnecting and configuring services (IP, DNS, proxy)
//! - Tracking oFono modems and their SIM cards
//! - Entering, resetting and changing SIM PINs with retry accounting
//! - Creating and configuring the cellular internet context
//!
//! # Example
//!
//! ```no_run
//! use cmrs::ConnectivityManager;
//!
//! # async fn example() -> cmrs::Result<()> {
//! let cm = ConnectivityManager::new().await?;
//!
//! // Wait for the first snapshot
//! let mut updates = cm.subscribe();
//! updates.changed().await.ok();
//!
//! for service in cm.services() {
//!     println!("{:?} ({})", service.name, service.state);
//! }
//!
//! // Connect to the first one
//! if let Some(service) = cm.services().first() {
//!     cm.connect_service(service.path.as_str()).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! All operations return `Result<T, ConnectivityError>`. Error replies from
//! the daemons keep their D-Bus error name; [`PinErrorKind::classify`] sorts
//! SIM failures into wrong and malformed credentials.
//!
//! # Signal-Based State Tracking
//!
//! The engine subscribes to `PropertyChanged`, `ModemAdded` and
//! `ModemRemoved` before reading initial state, so nothing that happens
//! during startup is missed. All updates are applied by one task in arrival
//! order, and completions for objects that have since disappeared are
//! ignored.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`. For example:
//!
//! ```no_run,ignore
//! env_logger::init();
//! // ...
//! ```

// Internal implementation modules
mod core;
mod monitoring;
mod types;
mod util;

// Public API modules
pub mod api;
pub mod dbus;

// Re-exported public API
pub use api::connectivity::ConnectivityManager;
pub use api::models::{
    BusKind, CallClass, CellularContext, ConnectivityError, ConnectivitySnapshot,
    ContextSettings, EngineConfig, IpSettings, ManagerState, Modem, PinErrorKind, PinType,
    PinValidationError, ProxySettings, Security, Service, ServiceState, ServiceType,
    Technologies, TimeoutConfig,
};
pub use api::overlay::PropertyOverlay;
pub use crate::core::pin::{PinRequest, PinState, PinStateMachine};
pub use crate::core::service_mutator::ServiceMutator;

/// A specialized `Result` type for connectivity operations.
pub type Result<T> = std::result::Result<T, ConnectivityError>;
