//! D-Bus plumbing for ConnMan and oFono.
//!
//! Every remote object this crate talks to is reached through a
//! [`BusProxy`]: a thin wrapper around an untyped `zbus::Proxy` that applies
//! per-call timeouts and turns error replies into [`ConnectivityError`]s.
//! Logic that only needs to issue calls is written against the
//! [`RemoteObject`] trait so it can be driven by [`mock::MockRemote`] too.
//!
//! [`ConnectivityError`]: crate::ConnectivityError

mod bus_proxy;
pub(crate) mod connman;
pub mod mock;
pub(crate) mod ofono;

pub use bus_proxy::BusProxy;

use async_trait::async_trait;
use std::collections::HashMap;
use zvariant::{OwnedObjectPath, OwnedValue};

use crate::Result;
use crate::api::models::CallClass;

/// Property dictionary as returned by `GetProperties`.
pub type PropertyMap = HashMap<String, OwnedValue>;

/// Argument shapes used by ConnMan and oFono methods.
#[derive(Debug)]
pub enum CallArgs {
    /// No arguments.
    None,
    /// One to three string arguments.
    Str(Vec<String>),
    /// A single object path.
    Path(OwnedObjectPath),
    /// A property name and its new value (`SetProperty`).
    KeyValue(String, OwnedValue),
}

impl CallArgs {
    /// Convenience for string arguments.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Str(items.into_iter().map(Into::into).collect())
    }
}

/// A remote object that accepts method calls.
#[async_trait]
pub trait RemoteObject: Send + Sync {
    /// Object path of the remote object.
    fn object_path(&self) -> &str;

    /// Calls `GetProperties` and returns the full dictionary.
    async fn get_properties(&self) -> Result<PropertyMap>;

    /// Calls a method whose reply carries no values.
    async fn invoke(&self, method: &str, args: CallArgs, class: CallClass) -> Result<()>;

    /// Calls a method that returns a single object path.
    async fn invoke_for_path(&self, method: &str, args: CallArgs) -> Result<OwnedObjectPath>;

    /// Calls a method returning `a(oa{sv})`, such as `GetModems`.
    async fn list_children(&self, method: &str) -> Result<Vec<(OwnedObjectPath, PropertyMap)>>;
}
