use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use futures::{FutureExt, future, select};
use futures_timer::Delay;
use log::{debug, warn};
use std::pin::pin;
use zbus::Connection;
use zbus::proxy::{CacheProperties, SignalStream};
use zvariant::{DynamicDeserialize, DynamicType, OwnedObjectPath, OwnedValue};

use super::{CallArgs, PropertyMap, RemoteObject};
use crate::Result;
use crate::api::models::{CallClass, ConnectivityError, TimeoutConfig};
use crate::types::constants::members;

/// Handle to one remote object on one interface.
///
/// Calls are bounded by the [`TimeoutConfig`] the proxy was built with. The
/// proxy does not cache properties: ConnMan and oFono expose their state
/// through `GetProperties`/`PropertyChanged` rather than the standard
/// properties interface.
#[derive(Debug, Clone)]
pub struct BusProxy {
    proxy: zbus::Proxy<'static>,
    path: OwnedObjectPath,
    interface: &'static str,
    timeouts: TimeoutConfig,
}

impl BusProxy {
    /// Builds a proxy for `path` on `interface` of `destination`.
    pub async fn new(
        conn: &Connection,
        destination: &'static str,
        path: OwnedObjectPath,
        interface: &'static str,
        timeouts: TimeoutConfig,
    ) -> Result<Self> {
        let proxy = zbus::proxy::Builder::new(conn)
            .destination(destination)?
            .path(path.clone())?
            .interface(interface)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        Ok(Self {
            proxy,
            path,
            interface,
            timeouts,
        })
    }

    /// Interface this proxy talks to.
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Object path as an owned path.
    pub fn path(&self) -> &OwnedObjectPath {
        &self.path
    }

    /// Issues a call and waits for the reply within the class budget.
    async fn call<B, R>(&self, method: &str, body: &B, class: CallClass) -> Result<R>
    where
        B: serde::Serialize + DynamicType + Sync,
        R: for<'d> DynamicDeserialize<'d> + Send,
    {
        let budget = self.timeouts.for_class(class);
        debug!("{} {}.{} (timeout {:?})", self.path, self.interface, method, budget);

        let reply = async {
            let reply: zbus::Result<R> = self.proxy.call(method, body).await;
            reply
        };
        let mut reply = pin!(reply.fuse());
        let mut timeout = pin!(Delay::new(budget).fuse());

        select! {
            result = reply => result.map_err(|e| map_call_error(method, e)),
            _ = timeout => {
                warn!("{}.{} on {} timed out after {:?}", self.interface, method, self.path, budget);
                Err(ConnectivityError::Timeout)
            }
        }
    }

    /// Subscribes to a signal on this object.
    pub async fn subscribe(&self, signal: &'static str) -> Result<SignalStream<'static>> {
        Ok(self.proxy.receive_signal(signal).await?)
    }

    /// Stream of `PropertyChanged(name, value)` notifications.
    ///
    /// Malformed signals are logged and skipped.
    pub async fn property_changes(&self) -> Result<BoxStream<'static, (String, OwnedValue)>> {
        let stream = self.subscribe(members::PROPERTY_CHANGED).await?;
        let path = self.path.clone();

        Ok(stream
            .filter_map(move |msg| {
                let change = match msg.body().deserialize::<(String, OwnedValue)>() {
                    Ok(change) => Some(change),
                    Err(e) => {
                        warn!("Malformed PropertyChanged on {path}: {e}");
                        None
                    }
                };
                future::ready(change)
            })
            .boxed())
    }
}

fn map_call_error(method: &str, err: zbus::Error) -> ConnectivityError {
    match err {
        zbus::Error::MethodError(name, message, _) => {
            debug!("{method} failed: {name} {message:?}");
            ConnectivityError::MethodFailed {
                name: name.to_string(),
                message,
            }
        }
        other => ConnectivityError::Dbus(other),
    }
}

#[async_trait]
impl RemoteObject for BusProxy {
    fn object_path(&self) -> &str {
        self.path.as_str()
    }

    async fn get_properties(&self) -> Result<PropertyMap> {
        self.call(members::GET_PROPERTIES, &(), CallClass::Default)
            .await
    }

    async fn invoke(&self, method: &str, args: CallArgs, class: CallClass) -> Result<()> {
        match &args {
            CallArgs::None => self.call(method, &(), class).await,
            CallArgs::Str(strings) => match strings.as_slice() {
                [a] => self.call(method, &(a.as_str(),), class).await,
                [a, b] => self.call(method, &(a.as_str(), b.as_str()), class).await,
                [a, b, c] => {
                    self.call(method, &(a.as_str(), b.as_str(), c.as_str()), class)
                        .await
                }
                _ => Err(ConnectivityError::UnsupportedArguments(method.to_string())),
            },
            CallArgs::Path(path) => self.call(method, &(path,), class).await,
            CallArgs::KeyValue(key, value) => {
                let value: &zvariant::Value<'static> = value;
                self.call(method, &(key.as_str(), value), class).await
            }
        }
    }

    async fn invoke_for_path(&self, method: &str, args: CallArgs) -> Result<OwnedObjectPath> {
        match &args {
            CallArgs::Str(strings) if strings.len() == 1 => {
                self.call(method, &(strings[0].as_str(),), CallClass::Default)
                    .await
            }
            CallArgs::None => self.call(method, &(), CallClass::Default).await,
            _ => Err(ConnectivityError::UnsupportedArguments(method.to_string())),
        }
    }

    async fn list_children(&self, method: &str) -> Result<Vec<(OwnedObjectPath, PropertyMap)>> {
        self.call(method, &(), CallClass::Default).await
    }
}
