//! Change notification for callers that prefer callbacks to a watch channel.

use futures::{FutureExt, select};
use log::debug;
use tokio::sync::watch;

use crate::Result;
use crate::api::models::{ConnectivityError, ConnectivitySnapshot};

/// Invokes `callback` with every snapshot the engine publishes.
///
/// Returns `Ok(())` once `shutdown` fires or its sender is dropped, and
/// [`ConnectivityError::EngineStopped`] if the engine goes away first.
pub(crate) async fn monitor_changes<F>(
    mut snapshots: watch::Receiver<ConnectivitySnapshot>,
    mut shutdown: watch::Receiver<()>,
    callback: F,
) -> Result<()>
where
    F: Fn(&ConnectivitySnapshot) + 'static,
{
    loop {
        select! {
            changed = snapshots.changed().fuse() => {
                if changed.is_err() {
                    return Err(ConnectivityError::EngineStopped);
                }
                debug!("Connectivity snapshot changed");
                let snapshot = snapshots.borrow_and_update().clone();
                callback(&snapshot);
            }
            _ = shutdown.changed().fuse() => {
                debug!("Change monitoring stopped");
                return Ok(());
            }
        }
    }
}
