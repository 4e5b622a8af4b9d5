//! Commands against a single ConnMan service.
//!
//! Calls here never touch the local cache. The daemon answers every change
//! with a `PropertyChanged` that flows back through the registry, except for
//! the passphrase, which the engine echoes itself after a successful submit.

use log::debug;
use zvariant::OwnedValue;

use crate::Result;
use crate::api::models::{CallClass, IpSettings, ProxySettings};
use crate::dbus::{CallArgs, RemoteObject};
use crate::types::constants::{members, service_keys};
use crate::util::utils::{
    encode_bool, encode_ip_settings, encode_proxy_settings, encode_string, encode_string_list,
};

/// Issues commands to one `net.connman.Service` object.
///
/// # Example
///
/// ```rust
/// use cmrs::ServiceMutator;
/// use cmrs::dbus::mock::MockRemote;
///
/// # async fn example() -> cmrs::Result<()> {
/// let remote = MockRemote::new("/net/connman/service/wifi_home");
/// let service = ServiceMutator::new(remote.clone());
/// service.connect().await?;
/// assert_eq!(remote.methods(), vec!["Connect"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ServiceMutator<R: RemoteObject> {
    remote: R,
}

impl<R: RemoteObject> ServiceMutator<R> {
    /// Wraps a remote service object.
    pub fn new(remote: R) -> Self {
        Self { remote }
    }

    /// Path of the service.
    pub fn path(&self) -> &str {
        self.remote.object_path()
    }

    /// Connects; bounded by the connect timeout.
    pub async fn connect(&self) -> Result<()> {
        debug!("Connecting {}", self.path());
        self.remote
            .invoke(members::CONNECT, CallArgs::None, CallClass::Connect)
            .await
    }

    /// Disconnects.
    pub async fn disconnect(&self) -> Result<()> {
        debug!("Disconnecting {}", self.path());
        self.remote
            .invoke(members::DISCONNECT, CallArgs::None, CallClass::Default)
            .await
    }

    /// Removes the service's stored configuration (forget network).
    pub async fn remove(&self) -> Result<()> {
        debug!("Removing {}", self.path());
        self.remote
            .invoke(members::REMOVE, CallArgs::None, CallClass::Default)
            .await
    }

    /// Sets a raw property.
    pub async fn set_property(&self, key: &str, value: OwnedValue) -> Result<()> {
        self.remote
            .invoke(
                members::SET_PROPERTY,
                CallArgs::KeyValue(key.to_string(), value),
                CallClass::Default,
            )
            .await
    }

    /// Resets a property to its default.
    pub async fn clear_property(&self, key: &str) -> Result<()> {
        self.remote
            .invoke(
                members::CLEAR_PROPERTY,
                CallArgs::strings([key]),
                CallClass::Default,
            )
            .await
    }

    /// Sends a passphrase.
    pub async fn submit_passphrase(&self, passphrase: &str) -> Result<()> {
        self.set_property(service_keys::PASSPHRASE, encode_string(passphrase)?)
            .await
    }

    /// Requests an IPv4 configuration.
    pub async fn configure_ipv4(&self, settings: &IpSettings) -> Result<()> {
        self.set_property(service_keys::IPV4_CONFIGURATION, encode_ip_settings(settings)?)
            .await
    }

    /// Requests an IPv6 configuration.
    pub async fn configure_ipv6(&self, settings: &IpSettings) -> Result<()> {
        self.set_property(service_keys::IPV6_CONFIGURATION, encode_ip_settings(settings)?)
            .await
    }

    /// Requests DNS servers; an empty list reverts to the automatic ones.
    pub async fn configure_nameservers(&self, servers: &[String]) -> Result<()> {
        self.set_property(
            service_keys::NAMESERVERS_CONFIGURATION,
            encode_string_list(servers)?,
        )
        .await
    }

    /// Requests a proxy configuration.
    pub async fn configure_proxy(&self, settings: &ProxySettings) -> Result<()> {
        self.set_property(
            service_keys::PROXY_CONFIGURATION,
            encode_proxy_settings(settings)?,
        )
        .await
    }

    /// Enables or disables automatic connection.
    pub async fn set_autoconnect(&self, enabled: bool) -> Result<()> {
        self.set_property(service_keys::AUTO_CONNECT, encode_bool(enabled)?)
            .await
    }
}
