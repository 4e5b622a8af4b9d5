//! The synchronisation engine.
//!
//! One tokio task owns the service and modem registries. Everything that
//! happens on the bus (signals, call completions) is turned into an
//! [`EngineEvent`] by a small forwarding task and pushed into a single
//! channel; the engine applies events one at a time through
//! [`EngineState::handle`], which is pure and returns the follow-up
//! [`Action`]s to carry out. After each event a fresh
//! [`ConnectivitySnapshot`] is published if anything changed.
//!
//! Per-object forwarding tasks are aborted when their object goes away.
//! Events already queued for a removed object reach the registries anyway
//! and are dropped there by the existence and ticket checks.

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, trace, warn};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use zbus::Connection;
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::Result;
use crate::api::models::{
    CallClass, ConnectivitySnapshot, EngineConfig, ManagerState, PinType, Technologies,
};
use crate::core::modem_registry::{ModemChange, ModemRegistry, SimTicket};
use crate::core::pin::PinRequest;
use crate::core::service_registry::{FetchTicket, PropertyChange, ServiceRegistry};
use crate::dbus::{BusProxy, CallArgs, PropertyMap, RemoteObject, connman, ofono};
use crate::types::constants::{members, service_keys};
use crate::util::utils::{as_bool, as_nonempty_string, as_path_list, as_string_list};

/// A credential operation requested through the public API.
#[derive(Debug)]
pub(crate) enum PinCommand {
    Enter {
        modem: String,
        pin: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SubmitPuk {
        modem: String,
        puk: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Reset {
        modem: String,
        new_pin: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Change {
        modem: String,
        kind: PinType,
        old_pin: String,
        new_pin: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Everything the engine reacts to.
#[derive(Debug)]
pub(crate) enum EngineEvent {
    ManagerProperties(PropertyMap),
    ManagerPropertyChanged(String, OwnedValue),
    ServiceFetched(FetchTicket, PropertyMap),
    ServicePropertyChanged(OwnedObjectPath, String, OwnedValue),
    ModemsEnumerated(Vec<(OwnedObjectPath, PropertyMap)>),
    ModemAdded(OwnedObjectPath, PropertyMap),
    /// A watcher's re-read of a modem it already tracks.
    ModemRefreshed(OwnedObjectPath, PropertyMap),
    ModemRemoved(OwnedObjectPath),
    ModemPropertyChanged(OwnedObjectPath, String, OwnedValue),
    SimFetched(SimTicket, PropertyMap),
    SimPropertyChanged(OwnedObjectPath, String, OwnedValue),
    PassphraseSubmitted(OwnedObjectPath, String),
    ServiceForgotten(OwnedObjectPath),
    Pin(PinCommand),
    PinCallFinished {
        modem: String,
        request: PinRequest,
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Follow-up work requested by [`EngineState::handle`].
#[derive(Debug)]
pub(crate) enum Action {
    /// Subscribe to a new service, then fetch it.
    AttachService(FetchTicket),
    DetachService(OwnedObjectPath),
    RefetchService(FetchTicket),
    /// Fire-and-forget `RemoveProvider` on the ConnMan manager.
    RemoveProvider(OwnedObjectPath),
    AttachModem(OwnedObjectPath),
    DetachModem(OwnedObjectPath),
    /// Subscribe to the SIM manager, then fetch it.
    AttachSim(SimTicket),
    DetachSim(OwnedObjectPath),
    SimCall {
        modem: String,
        request: PinRequest,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Registry state plus the ConnMan manager properties.
#[derive(Debug)]
pub(crate) struct EngineState {
    manager: ManagerState,
    services: ServiceRegistry,
    modems: ModemRegistry,
    dirty: bool,
}

impl EngineState {
    pub(crate) fn new() -> Self {
        Self {
            manager: ManagerState::default(),
            services: ServiceRegistry::new(),
            modems: ModemRegistry::new(),
            dirty: false,
        }
    }

    /// Applies one event and returns the follow-up work.
    pub(crate) fn handle(&mut self, event: EngineEvent) -> Vec<Action> {
        let mut actions = Vec::new();

        match event {
            EngineEvent::ManagerProperties(properties) => {
                self.manager.available = true;
                self.dirty = true;
                for (key, value) in &properties {
                    self.apply_manager_key(key, value, &mut actions);
                }
            }
            EngineEvent::ManagerPropertyChanged(key, value) => {
                self.apply_manager_key(&key, &value, &mut actions);
            }
            EngineEvent::ServiceFetched(ticket, properties) => {
                self.dirty |= self.services.complete_fetch(&ticket, &properties);
            }
            EngineEvent::ServicePropertyChanged(path, key, value) => {
                match self.services.apply_property_change(&path, &key, &value) {
                    PropertyChange::Unknown => {}
                    PropertyChange::Applied => self.dirty = true,
                    PropertyChange::Refetch(ticket) => {
                        self.dirty = true;
                        actions.push(Action::RefetchService(ticket));
                    }
                    PropertyChange::RemoveProvider(path) => {
                        self.dirty = true;
                        actions.push(Action::RemoveProvider(path));
                    }
                }
            }
            EngineEvent::ModemsEnumerated(modems) => {
                for (path, properties) in modems {
                    self.add_modem(path, &properties, &mut actions);
                }
            }
            EngineEvent::ModemAdded(path, properties) => {
                self.add_modem(path, &properties, &mut actions);
            }
            EngineEvent::ModemRefreshed(path, properties) => {
                let change = self.modems.refresh_modem(&path, &properties);
                self.push_modem_change(change, &mut actions);
            }
            EngineEvent::ModemRemoved(path) => {
                if self.modems.remove_modem(&path) {
                    self.dirty = true;
                    actions.push(Action::DetachModem(path));
                }
            }
            EngineEvent::ModemPropertyChanged(path, key, value) => {
                let change = self.modems.apply_modem_change(&path, &key, &value);
                self.push_modem_change(change, &mut actions);
            }
            EngineEvent::SimFetched(ticket, properties) => {
                self.dirty |= self.modems.complete_sim_fetch(&ticket, &properties);
            }
            EngineEvent::SimPropertyChanged(path, key, value) => {
                self.dirty |= self.modems.apply_sim_change(&path, &key, &value);
            }
            EngineEvent::PassphraseSubmitted(path, passphrase) => {
                self.dirty |= self.services.echo_passphrase(&path, &passphrase);
            }
            EngineEvent::ServiceForgotten(path) => {
                self.dirty |= self.services.forget_passphrase(&path);
            }
            EngineEvent::Pin(command) => self.handle_pin(command, &mut actions),
            EngineEvent::PinCallFinished {
                modem,
                request,
                result,
                reply,
            } => {
                if let Some(kind) = self.modems.complete_pin(&modem, &request, &result) {
                    debug!("{request:?} on {modem} failed: {kind}");
                }
                self.dirty = true;
                let _ = reply.send(result);
            }
            EngineEvent::Shutdown => {}
        }

        actions
    }

    fn apply_manager_key(&mut self, key: &str, value: &Value<'_>, actions: &mut Vec<Action>) {
        let technologies = |v: &Value<'_>| Technologies::from_names(as_string_list(v).unwrap_or_default());

        match key {
            service_keys::SERVICES => {
                let Some(paths) = as_path_list(value) else {
                    warn!("Malformed Services property");
                    return;
                };
                let outcome = self.services.reconcile(&paths);
                if outcome.is_empty() {
                    return;
                }
                actions.extend(outcome.removed.into_iter().map(Action::DetachService));
                actions.extend(outcome.added.into_iter().map(Action::AttachService));
            }
            service_keys::OFFLINE_MODE => {
                self.manager.offline_mode = as_bool(value).unwrap_or(false)
            }
            service_keys::STATE => self.manager.state = as_nonempty_string(value),
            service_keys::AVAILABLE_TECHNOLOGIES => {
                self.manager.available_technologies = technologies(value)
            }
            service_keys::ENABLED_TECHNOLOGIES => {
                self.manager.enabled_technologies = technologies(value)
            }
            service_keys::CONNECTED_TECHNOLOGIES => {
                self.manager.connected_technologies = technologies(value)
            }
            _ => {
                trace!("Ignoring manager property {key}");
                return;
            }
        }
        self.dirty = true;
    }

    fn add_modem(&mut self, path: OwnedObjectPath, properties: &PropertyMap, actions: &mut Vec<Action>) {
        let is_new = self.modems.get(path.as_str()).is_none();
        let change = self.modems.add_modem(path.clone(), properties);
        self.dirty = true;
        if is_new {
            actions.push(Action::AttachModem(path));
        }
        self.push_modem_change(change, actions);
    }

    fn push_modem_change(&mut self, change: ModemChange, actions: &mut Vec<Action>) {
        match change {
            ModemChange::Unknown => {}
            ModemChange::Applied => self.dirty = true,
            ModemChange::AttachSim(ticket) => {
                self.dirty = true;
                actions.push(Action::AttachSim(ticket));
            }
            ModemChange::DetachSim(path) => {
                self.dirty = true;
                actions.push(Action::DetachSim(path));
            }
        }
    }

    fn handle_pin(&mut self, command: PinCommand, actions: &mut Vec<Action>) {
        let (modem, prepared, reply) = match command {
            PinCommand::Enter { modem, pin, reply } => {
                let prepared = self
                    .modems
                    .pin_mut(&modem)
                    .and_then(|m| m.begin_enter_pin(&pin));
                (modem, prepared, reply)
            }
            PinCommand::SubmitPuk { modem, puk, reply } => {
                let result = self.modems.pin_mut(&modem).and_then(|m| m.submit_puk(&puk));
                self.dirty |= result.is_ok();
                let _ = reply.send(result);
                return;
            }
            PinCommand::Reset {
                modem,
                new_pin,
                reply,
            } => {
                let prepared = self
                    .modems
                    .pin_mut(&modem)
                    .and_then(|m| m.begin_reset_pin(&new_pin));
                (modem, prepared, reply)
            }
            PinCommand::Change {
                modem,
                kind,
                old_pin,
                new_pin,
                reply,
            } => {
                let prepared = self
                    .modems
                    .pin_mut(&modem)
                    .and_then(|m| m.begin_change_pin(&kind, &old_pin, &new_pin));
                (modem, prepared, reply)
            }
        };

        match prepared {
            Ok(request) => actions.push(Action::SimCall {
                modem,
                request,
                reply,
            }),
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Returns whether anything changed since the last call.
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn snapshot(&self) -> ConnectivitySnapshot {
        trace!(
            "Snapshot: {} services, {} modems",
            self.services.len(),
            self.modems.len()
        );
        ConnectivitySnapshot {
            manager: self.manager.clone(),
            services: self.services.snapshot(),
            last_active: self.services.last_active().cloned(),
            modems: self.modems.iter().cloned().collect(),
            present_sims: self.modems.present_sims(),
            required_pins: self.modems.required_pins().clone(),
            locked_puks: self.modems.locked_puks().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum WatchKey {
    ConnmanManager,
    OfonoManager,
    Service(OwnedObjectPath),
    Modem(OwnedObjectPath),
    Sim(OwnedObjectPath),
}

/// Handle kept by the public API; stops the engine when dropped.
#[derive(Debug)]
pub(crate) struct EngineHandle {
    pub(crate) conn: Connection,
    pub(crate) config: EngineConfig,
    events: mpsc::UnboundedSender<EngineEvent>,
    snapshots: watch::Receiver<ConnectivitySnapshot>,
}

impl EngineHandle {
    pub(crate) fn send(&self, event: EngineEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| crate::ConnectivityError::EngineStopped)
    }

    pub(crate) fn snapshots(&self) -> watch::Receiver<ConnectivitySnapshot> {
        self.snapshots.clone()
    }

    pub(crate) fn snapshot(&self) -> ConnectivitySnapshot {
        self.snapshots.borrow().clone()
    }

    /// Reads the latest snapshot without cloning it.
    pub(crate) fn with_snapshot<R>(&self, f: impl FnOnce(&ConnectivitySnapshot) -> R) -> R {
        f(&self.snapshots.borrow())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.events.send(EngineEvent::Shutdown);
    }
}

/// Starts the engine on the current tokio runtime.
pub(crate) fn spawn(conn: Connection, config: EngineConfig) -> EngineHandle {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(ConnectivitySnapshot::default());

    let engine = Engine {
        conn: conn.clone(),
        config,
        state: EngineState::new(),
        events_tx: events_tx.clone(),
        events_rx,
        snapshot_tx,
        watchers: HashMap::new(),
    };
    tokio::spawn(engine.run());

    EngineHandle {
        conn,
        config,
        events: events_tx,
        snapshots: snapshot_rx,
    }
}

struct Engine {
    conn: Connection,
    config: EngineConfig,
    state: EngineState,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    snapshot_tx: watch::Sender<ConnectivitySnapshot>,
    watchers: HashMap<WatchKey, JoinHandle<()>>,
}

impl Engine {
    async fn run(mut self) {
        self.start_connman();
        if self.config.track_modems {
            self.start_ofono();
        }

        while let Some(event) = self.events_rx.recv().await {
            if matches!(event, EngineEvent::Shutdown) {
                break;
            }
            for action in self.state.handle(event) {
                self.execute(action);
            }
            if self.state.take_dirty() {
                self.snapshot_tx.send_replace(self.state.snapshot());
            }
        }

        for (_, task) in self.watchers.drain() {
            task.abort();
        }
        debug!("Connectivity engine stopped");
    }

    fn watch(&mut self, key: WatchKey, task: JoinHandle<()>) {
        if let Some(old) = self.watchers.insert(key, task) {
            old.abort();
        }
    }

    fn unwatch(&mut self, key: &WatchKey) {
        if let Some(task) = self.watchers.remove(key) {
            task.abort();
        }
    }

    fn start_connman(&mut self) {
        let conn = self.conn.clone();
        let tx = self.events_tx.clone();
        let timeouts = self.config.timeouts;

        let task = tokio::spawn(async move {
            let manager = match connman::manager(&conn, timeouts).await {
                Ok(manager) => manager,
                Err(e) => {
                    warn!("ConnMan unavailable: {e}");
                    return;
                }
            };

            // Subscribe to signals FIRST to avoid race condition
            let changes = match manager.property_changes().await {
                Ok(changes) => changes,
                Err(e) => {
                    warn!("ConnMan unavailable: {e}");
                    return;
                }
            };

            match manager.get_properties().await {
                Ok(properties) => {
                    debug!("ConnMan manager reported {} properties", properties.len());
                    let _ = tx.send(EngineEvent::ManagerProperties(properties));
                }
                Err(e) => {
                    warn!("ConnMan unavailable: {e}");
                    return;
                }
            }

            forward(
                changes.map(|(key, value)| EngineEvent::ManagerPropertyChanged(key, value)),
                &tx,
            )
            .await;
        });
        self.watch(WatchKey::ConnmanManager, task);
    }

    fn start_ofono(&mut self) {
        let conn = self.conn.clone();
        let tx = self.events_tx.clone();
        let timeouts = self.config.timeouts;

        let task = tokio::spawn(async move {
            let manager = match ofono::manager(&conn, timeouts).await {
                Ok(manager) => manager,
                Err(e) => {
                    warn!("oFono unavailable: {e}");
                    return;
                }
            };

            let signals = match modem_signals(&manager).await {
                Ok(signals) => signals,
                Err(e) => {
                    warn!("oFono unavailable: {e}");
                    return;
                }
            };

            match manager.list_children(members::GET_MODEMS).await {
                Ok(modems) => {
                    debug!("oFono reported {} modems", modems.len());
                    let _ = tx.send(EngineEvent::ModemsEnumerated(modems));
                }
                Err(e) => {
                    warn!("oFono unavailable: {e}");
                    return;
                }
            }

            forward(signals, &tx).await;
        });
        self.watch(WatchKey::OfonoManager, task);
    }

    fn execute(&mut self, action: Action) {
        let conn = self.conn.clone();
        let tx = self.events_tx.clone();
        let timeouts = self.config.timeouts;

        match action {
            Action::AttachService(ticket) => {
                let key = WatchKey::Service(ticket.path.clone());
                let task = tokio::spawn(async move {
                    let path = ticket.path.clone();
                    let proxy = match connman::service(&conn, path.clone(), timeouts).await {
                        Ok(proxy) => proxy,
                        Err(e) => {
                            warn!("Failed to open service {path}: {e}");
                            return;
                        }
                    };
                    // Subscribe before fetching so no change falls in between.
                    let changes = match proxy.property_changes().await {
                        Ok(changes) => changes,
                        Err(e) => {
                            warn!("Service subscription on {path} failed: {e}");
                            return;
                        }
                    };
                    fetch_service(&proxy, ticket, &tx).await;
                    forward(
                        changes.map(move |(key, value)| {
                            EngineEvent::ServicePropertyChanged(path.clone(), key, value)
                        }),
                        &tx,
                    )
                    .await;
                });
                self.watch(key, task);
            }
            Action::DetachService(path) => self.unwatch(&WatchKey::Service(path)),
            Action::RefetchService(ticket) => {
                tokio::spawn(async move {
                    match connman::service(&conn, ticket.path.clone(), timeouts).await {
                        Ok(proxy) => fetch_service(&proxy, ticket, &tx).await,
                        Err(e) => warn!("Failed to open service {}: {e}", ticket.path),
                    }
                });
            }
            Action::RemoveProvider(path) => {
                tokio::spawn(async move {
                    let result = async {
                        connman::manager(&conn, timeouts)
                            .await?
                            .invoke(
                                members::REMOVE_PROVIDER,
                                CallArgs::Path(path.clone()),
                                CallClass::Default,
                            )
                            .await
                    }
                    .await;
                    if let Err(e) = result {
                        debug!("RemoveProvider {path} failed: {e}");
                    }
                });
            }
            Action::AttachModem(path) => {
                let key = WatchKey::Modem(path.clone());
                let task = tokio::spawn(async move {
                    let proxy = match ofono::modem(&conn, path.clone(), timeouts).await {
                        Ok(proxy) => proxy,
                        Err(e) => {
                            warn!("Failed to open modem {path}: {e}");
                            return;
                        }
                    };
                    let changes = match proxy.property_changes().await {
                        Ok(changes) => changes,
                        Err(e) => {
                            warn!("Modem subscription on {path} failed: {e}");
                            return;
                        }
                    };
                    // Catch changes between ModemAdded and the subscription.
                    if let Ok(properties) = proxy.get_properties().await {
                        let _ = tx.send(EngineEvent::ModemRefreshed(path.clone(), properties));
                    }
                    forward(
                        changes.map(move |(key, value)| {
                            EngineEvent::ModemPropertyChanged(path.clone(), key, value)
                        }),
                        &tx,
                    )
                    .await;
                });
                self.watch(key, task);
            }
            Action::DetachModem(path) => {
                self.unwatch(&WatchKey::Sim(path.clone()));
                self.unwatch(&WatchKey::Modem(path));
            }
            Action::AttachSim(ticket) => {
                let key = WatchKey::Sim(ticket.path.clone());
                let task = tokio::spawn(async move {
                    let path = ticket.path.clone();
                    let proxy = match ofono::sim_manager(&conn, path.clone(), timeouts).await {
                        Ok(proxy) => proxy,
                        Err(e) => {
                            warn!("Failed to open SIM manager on {path}: {e}");
                            return;
                        }
                    };
                    let changes = match proxy.property_changes().await {
                        Ok(changes) => changes,
                        Err(e) => {
                            warn!("SIM subscription on {path} failed: {e}");
                            return;
                        }
                    };
                    match proxy.get_properties().await {
                        Ok(properties) => {
                            let _ = tx.send(EngineEvent::SimFetched(ticket, properties));
                        }
                        Err(e) => warn!("SIM GetProperties on {path} failed: {e}"),
                    }
                    forward(
                        changes.map(move |(key, value)| {
                            EngineEvent::SimPropertyChanged(path.clone(), key, value)
                        }),
                        &tx,
                    )
                    .await;
                });
                self.watch(key, task);
            }
            Action::DetachSim(path) => self.unwatch(&WatchKey::Sim(path)),
            Action::SimCall {
                modem,
                request,
                reply,
            } => {
                tokio::spawn(async move {
                    let result = async {
                        let path = OwnedObjectPath::try_from(modem.as_str())?;
                        ofono::sim_manager(&conn, path, timeouts)
                            .await?
                            .invoke(request.method(), request.args(), CallClass::Default)
                            .await
                    }
                    .await;
                    let _ = tx.send(EngineEvent::PinCallFinished {
                        modem,
                        request,
                        result,
                        reply,
                    });
                });
            }
        }
    }
}

async fn fetch_service(proxy: &BusProxy, ticket: FetchTicket, tx: &mpsc::UnboundedSender<EngineEvent>) {
    match proxy.get_properties().await {
        Ok(properties) => {
            let _ = tx.send(EngineEvent::ServiceFetched(ticket, properties));
        }
        // The entry stays provisional; the next PropertyChanged fills it in.
        Err(e) => warn!("GetProperties on {} failed: {e}", ticket.path),
    }
}

/// `ModemAdded` and `ModemRemoved` as one event stream.
async fn modem_signals(manager: &BusProxy) -> Result<BoxStream<'static, EngineEvent>> {
    let added = manager
        .subscribe(members::MODEM_ADDED)
        .await?
        .filter_map(|msg| {
            let event = match msg.body().deserialize::<(OwnedObjectPath, PropertyMap)>() {
                Ok((path, properties)) => Some(EngineEvent::ModemAdded(path, properties)),
                Err(e) => {
                    warn!("Malformed ModemAdded: {e}");
                    None
                }
            };
            future::ready(event)
        })
        .boxed();

    let removed = manager
        .subscribe(members::MODEM_REMOVED)
        .await?
        .filter_map(|msg| {
            let event = match msg.body().deserialize::<OwnedObjectPath>() {
                Ok(path) => Some(EngineEvent::ModemRemoved(path)),
                Err(e) => {
                    warn!("Malformed ModemRemoved: {e}");
                    None
                }
            };
            future::ready(event)
        })
        .boxed();

    Ok(stream::select_all([added, removed]).boxed())
}

/// Pushes every item into the engine until either side goes away.
async fn forward<S>(mut events: S, tx: &mpsc::UnboundedSender<EngineEvent>)
where
    S: futures::Stream<Item = EngineEvent> + Unpin,
{
    while let Some(event) = events.next().await {
        if tx.send(event).is_err() {
            return;
        }
    }
    debug!("Signal stream ended");
}
