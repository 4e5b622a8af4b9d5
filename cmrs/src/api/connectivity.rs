use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use zbus::Connection;
use zvariant::{OwnedObjectPath, OwnedValue};

use crate::Result;
use crate::api::models::{
    BusKind, CallClass, CellularContext, ConnectivityError, ConnectivitySnapshot, ContextSettings,
    EngineConfig, IpSettings, Modem, PinType, ProxySettings, Service, TimeoutConfig,
};
use crate::core::cellular;
use crate::core::service_mutator::ServiceMutator;
use crate::dbus::{BusProxy, CallArgs, RemoteObject, connman, ofono};
use crate::monitoring::changes;
use crate::monitoring::engine::{self, EngineEvent, EngineHandle, PinCommand};
use crate::types::constants::{members, service_keys};
use crate::util::utils::encode_bool;

/// High-level interface to ConnMan and oFono over D-Bus.
///
/// Creating a manager starts a background engine that tracks every ConnMan
/// service and, unless disabled, every oFono modem. Reads come from the
/// latest [`ConnectivitySnapshot`]; commands go straight to the daemons and
/// their effects show up in a later snapshot.
///
/// Must be created inside a tokio runtime. Clones share one engine, which
/// stops when the last clone is dropped.
///
/// # Creating an Instance
///
/// ```no_run
/// use cmrs::ConnectivityManager;
///
/// # async fn example() -> cmrs::Result<()> {
/// let cm = ConnectivityManager::new().await?;
/// # Ok(())
/// # }
/// ```
///
/// # Examples
///
/// ## Listing services
///
/// ```no_run
/// use cmrs::ConnectivityManager;
///
/// # async fn example() -> cmrs::Result<()> {
/// let cm = ConnectivityManager::new().await?;
/// let mut updates = cm.subscribe();
/// updates.changed().await.ok();
///
/// for service in cm.services() {
///     println!("{} {:?} {}", service.index, service.name, service.state);
/// }
/// # Ok(())
/// # }
/// ```
///
/// ## Unlocking a SIM
///
/// ```no_run
/// use cmrs::{ConnectivityManager, PinState};
///
/// # async fn example() -> cmrs::Result<()> {
/// let cm = ConnectivityManager::new().await?;
/// for modem in cm.modems() {
///     if let PinState::PinRequired(_) = modem.pin.state() {
///         cm.enter_pin(modem.path.as_str(), "1234").await?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConnectivityManager {
    engine: Arc<EngineHandle>,
}

impl ConnectivityManager {
    /// Connects to the system bus with the default configuration.
    pub async fn new() -> Result<Self> {
        Self::with_config(EngineConfig::new()).await
    }

    /// Connects with a custom configuration.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use cmrs::{ConnectivityManager, EngineConfig, TimeoutConfig};
    ///
    /// # async fn example() -> cmrs::Result<()> {
    /// let config = EngineConfig::new().with_timeouts(
    ///     TimeoutConfig::new().with_connect_timeout(Duration::from_secs(60)),
    /// );
    /// let cm = ConnectivityManager::with_config(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_config(config: EngineConfig) -> Result<Self> {
        let conn = match config.bus {
            BusKind::System => Connection::system().await?,
            BusKind::Session => Connection::session().await?,
        };
        Ok(Self {
            engine: Arc::new(engine::spawn(conn, config)),
        })
    }

    /// Returns the timeout configuration in use.
    #[must_use]
    pub fn timeout_config(&self) -> TimeoutConfig {
        self.engine.config.timeouts
    }

    /// Returns the latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ConnectivitySnapshot {
        self.engine.snapshot()
    }

    /// Returns a receiver that is notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectivitySnapshot> {
        self.engine.snapshots()
    }

    /// Services in the Manager's order.
    #[must_use]
    pub fn services(&self) -> Vec<Service> {
        self.engine.with_snapshot(|s| s.services.clone())
    }

    /// Tracked modems, ordered by path.
    #[must_use]
    pub fn modems(&self) -> Vec<Modem> {
        self.engine.with_snapshot(|s| s.modems.clone())
    }

    /// Calls `callback` with every new snapshot until `shutdown` fires.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cmrs::ConnectivityManager;
    /// use tokio::sync::watch;
    ///
    /// # async fn example() -> cmrs::Result<()> {
    /// let cm = ConnectivityManager::new().await?;
    /// let (_stop, shutdown) = watch::channel(());
    /// cm.monitor_changes(shutdown, |snapshot| {
    ///     println!("{} services", snapshot.services.len());
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn monitor_changes<F>(&self, shutdown: watch::Receiver<()>, callback: F) -> Result<()>
    where
        F: Fn(&ConnectivitySnapshot) + 'static,
    {
        changes::monitor_changes(self.engine.snapshots(), shutdown, callback).await
    }

    /// Returns a command handle for a known service.
    pub async fn service(&self, path: &str) -> Result<ServiceMutator<BusProxy>> {
        if !self.engine.with_snapshot(|s| s.service(path).is_some()) {
            return Err(ConnectivityError::UnknownService(path.to_string()));
        }
        let proxy = connman::service(
            &self.engine.conn,
            OwnedObjectPath::try_from(path)?,
            self.engine.config.timeouts,
        )
        .await?;
        Ok(ServiceMutator::new(proxy))
    }

    /// Connects a service.
    pub async fn connect_service(&self, path: &str) -> Result<()> {
        self.service(path).await?.connect().await
    }

    /// Disconnects a service.
    pub async fn disconnect_service(&self, path: &str) -> Result<()> {
        self.service(path).await?.disconnect().await
    }

    /// Removes a service's stored configuration and any passphrase held for it.
    pub async fn remove_service(&self, path: &str) -> Result<()> {
        self.service(path).await?.remove().await?;
        self.engine
            .send(EngineEvent::ServiceForgotten(OwnedObjectPath::try_from(path)?))
    }

    /// Sets a raw service property.
    pub async fn set_service_property(&self, path: &str, key: &str, value: OwnedValue) -> Result<()> {
        self.service(path).await?.set_property(key, value).await
    }

    /// Resets a service property to its default.
    pub async fn clear_service_property(&self, path: &str, key: &str) -> Result<()> {
        self.service(path).await?.clear_property(key).await
    }

    /// Sends a passphrase to a service.
    ///
    /// ConnMan does not signal the passphrase back, so on success it is
    /// recorded in the cache directly.
    pub async fn submit_passphrase(&self, path: &str, passphrase: &str) -> Result<()> {
        let service = self.service(path).await?;
        service.submit_passphrase(passphrase).await?;
        self.engine.send(EngineEvent::PassphraseSubmitted(
            OwnedObjectPath::try_from(path)?,
            passphrase.to_string(),
        ))
    }

    /// Requests an IPv4 configuration.
    pub async fn configure_ipv4(&self, path: &str, settings: &IpSettings) -> Result<()> {
        self.service(path).await?.configure_ipv4(settings).await
    }

    /// Requests an IPv6 configuration.
    pub async fn configure_ipv6(&self, path: &str, settings: &IpSettings) -> Result<()> {
        self.service(path).await?.configure_ipv6(settings).await
    }

    /// Requests DNS servers.
    pub async fn configure_nameservers(&self, path: &str, servers: &[String]) -> Result<()> {
        self.service(path).await?.configure_nameservers(servers).await
    }

    /// Requests a proxy configuration.
    pub async fn configure_proxy(&self, path: &str, settings: &ProxySettings) -> Result<()> {
        self.service(path).await?.configure_proxy(settings).await
    }

    /// Enables or disables automatic connection.
    pub async fn set_autoconnect(&self, path: &str, enabled: bool) -> Result<()> {
        self.service(path).await?.set_autoconnect(enabled).await
    }

    /// Turns airplane mode on or off.
    pub async fn set_offline_mode(&self, enabled: bool) -> Result<()> {
        connman::manager(&self.engine.conn, self.engine.config.timeouts)
            .await?
            .invoke(
                members::SET_PROPERTY,
                CallArgs::KeyValue(service_keys::OFFLINE_MODE.to_string(), encode_bool(enabled)?),
                CallClass::Default,
            )
            .await
    }

    async fn pin_command<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> PinCommand,
    {
        let (reply, rx) = oneshot::channel();
        self.engine.send(EngineEvent::Pin(command(reply)))?;
        rx.await.map_err(|_| ConnectivityError::EngineStopped)?
    }

    /// Enters the credential the SIM currently asks for.
    ///
    /// When a PUK is asked for, the PUK is only remembered here; finish with
    /// [`reset_pin`](Self::reset_pin) once the new PIN is known.
    pub async fn enter_pin(&self, modem: &str, pin: &str) -> Result<()> {
        self.pin_command(|reply| PinCommand::Enter {
            modem: modem.to_string(),
            pin: pin.to_string(),
            reply,
        })
        .await
    }

    /// Remembers a PUK for a following [`reset_pin`](Self::reset_pin).
    pub async fn submit_puk(&self, modem: &str, puk: &str) -> Result<()> {
        self.pin_command(|reply| PinCommand::SubmitPuk {
            modem: modem.to_string(),
            puk: puk.to_string(),
            reply,
        })
        .await
    }

    /// Unblocks the SIM with the remembered PUK and sets a new PIN.
    pub async fn reset_pin(&self, modem: &str, new_pin: &str) -> Result<()> {
        self.pin_command(|reply| PinCommand::Reset {
            modem: modem.to_string(),
            new_pin: new_pin.to_string(),
            reply,
        })
        .await
    }

    /// Changes a PIN.
    pub async fn change_pin(
        &self,
        modem: &str,
        kind: PinType,
        old_pin: &str,
        new_pin: &str,
    ) -> Result<()> {
        self.pin_command(|reply| PinCommand::Change {
            modem: modem.to_string(),
            kind,
            old_pin: old_pin.to_string(),
            new_pin: new_pin.to_string(),
            reply,
        })
        .await
    }

    /// Remaining attempts per credential kind.
    pub fn pin_retries(&self, modem: &str) -> Result<HashMap<PinType, u8>> {
        self.engine.with_snapshot(|s| {
            s.modem(modem)
                .map(|m| m.retries.clone())
                .ok_or_else(|| ConnectivityError::UnknownModem(modem.to_string()))
        })
    }

    async fn connection_manager(&self, modem: &str) -> Result<BusProxy> {
        let capable = self
            .engine
            .with_snapshot(|s| s.modem(modem).map(|m| m.has_connection_manager));
        match capable {
            None => return Err(ConnectivityError::UnknownModem(modem.to_string())),
            Some(false) => return Err(ConnectivityError::NoConnectionManager(modem.to_string())),
            Some(true) => {}
        }
        ofono::connection_manager(
            &self.engine.conn,
            OwnedObjectPath::try_from(modem)?,
            self.engine.config.timeouts,
        )
        .await
    }

    /// Finds or creates the modem's internet context and writes `settings`.
    ///
    /// Returns the context path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cmrs::{ConnectivityManager, ContextSettings};
    ///
    /// # async fn example() -> cmrs::Result<()> {
    /// let cm = ConnectivityManager::new().await?;
    /// let settings = ContextSettings {
    ///     access_point_name: "internet.example".into(),
    ///     ..Default::default()
    /// };
    /// let context = cm.setup_cellular_context("/ril_0", settings).await?;
    /// println!("configured {context}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn setup_cellular_context(
        &self,
        modem: &str,
        settings: ContextSettings,
    ) -> Result<OwnedObjectPath> {
        let manager = self.connection_manager(modem).await?;
        let conn = self.engine.conn.clone();
        let timeouts = self.engine.config.timeouts;
        let open = move |path: OwnedObjectPath| {
            let conn = conn.clone();
            async move { ofono::context(&conn, path, timeouts).await }
        };
        cellular::setup_internet_context(&manager, open, settings).await
    }

    /// All contexts of a modem.
    pub async fn cellular_contexts(&self, modem: &str) -> Result<Vec<CellularContext>> {
        cellular::list_contexts(&self.connection_manager(modem).await?).await
    }

    /// The modem's internet context, if it has one.
    pub async fn internet_context(&self, modem: &str) -> Result<Option<CellularContext>> {
        cellular::internet_context(&self.connection_manager(modem).await?).await
    }

    /// Deletes a context.
    pub async fn remove_cellular_context(&self, modem: &str, context: &str) -> Result<()> {
        let manager = self.connection_manager(modem).await?;
        cellular::remove_context(&manager, OwnedObjectPath::try_from(context)?).await
    }
}
