//! Proxy constructors for oFono objects.

use zbus::Connection;
use zvariant::OwnedObjectPath;

use super::BusProxy;
use crate::Result;
use crate::api::models::TimeoutConfig;
use crate::types::constants::ofono;

/// The `org.ofono.Manager` object at `/`.
pub(crate) async fn manager(conn: &Connection, timeouts: TimeoutConfig) -> Result<BusProxy> {
    BusProxy::new(
        conn,
        ofono::SERVICE,
        OwnedObjectPath::try_from(ofono::MANAGER_PATH)?,
        ofono::MANAGER_INTERFACE,
        timeouts,
    )
    .await
}

/// The `org.ofono.Modem` interface of a modem.
pub(crate) async fn modem(
    conn: &Connection,
    path: OwnedObjectPath,
    timeouts: TimeoutConfig,
) -> Result<BusProxy> {
    BusProxy::new(conn, ofono::SERVICE, path, ofono::MODEM_INTERFACE, timeouts).await
}

/// The `org.ofono.SimManager` interface of a modem.
pub(crate) async fn sim_manager(
    conn: &Connection,
    path: OwnedObjectPath,
    timeouts: TimeoutConfig,
) -> Result<BusProxy> {
    BusProxy::new(
        conn,
        ofono::SERVICE,
        path,
        ofono::SIM_MANAGER_INTERFACE,
        timeouts,
    )
    .await
}

/// The `org.ofono.ConnectionManager` interface of a modem.
pub(crate) async fn connection_manager(
    conn: &Connection,
    path: OwnedObjectPath,
    timeouts: TimeoutConfig,
) -> Result<BusProxy> {
    BusProxy::new(
        conn,
        ofono::SERVICE,
        path,
        ofono::CONNECTION_MANAGER_INTERFACE,
        timeouts,
    )
    .await
}

/// An `org.ofono.ConnectionContext` object.
pub(crate) async fn context(
    conn: &Connection,
    path: OwnedObjectPath,
    timeouts: TimeoutConfig,
) -> Result<BusProxy> {
    BusProxy::new(
        conn,
        ofono::SERVICE,
        path,
        ofono::CONNECTION_CONTEXT_INTERFACE,
        timeouts,
    )
    .await
}
