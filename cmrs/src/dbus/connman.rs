//! Proxy constructors for ConnMan objects.

use zbus::Connection;
use zvariant::OwnedObjectPath;

use super::BusProxy;
use crate::Result;
use crate::api::models::TimeoutConfig;
use crate::types::constants::connman;

/// The `net.connman.Manager` object at `/`.
pub(crate) async fn manager(conn: &Connection, timeouts: TimeoutConfig) -> Result<BusProxy> {
    BusProxy::new(
        conn,
        connman::SERVICE,
        OwnedObjectPath::try_from(connman::MANAGER_PATH)?,
        connman::MANAGER_INTERFACE,
        timeouts,
    )
    .await
}

/// A `net.connman.Service` object.
pub(crate) async fn service(
    conn: &Connection,
    path: OwnedObjectPath,
    timeouts: TimeoutConfig,
) -> Result<BusProxy> {
    BusProxy::new(
        conn,
        connman::SERVICE,
        path,
        connman::SERVICE_INTERFACE,
        timeouts,
    )
    .await
}
