//! Cache of oFono modems and their SIM state.
//!
//! Modems come and go with `ModemAdded`/`ModemRemoved`. The SIM manager is
//! a sub-interface that appears and disappears with the modem's `Interfaces`
//! list; attaching it starts a second subscription and fetch, detaching it
//! clears every SIM-derived field.
//!
//! The aggregates (present SIM count, required PINs, locked PUKs) are updated
//! inside the same call that changes the per-modem field they derive from.

use log::{debug, trace};
use std::collections::{BTreeMap, HashMap};
use zvariant::{OwnedObjectPath, Value};

use crate::Result;
use crate::api::models::{ConnectivityError, Modem, PinErrorKind, PinType};
use crate::core::pin::{PinRequest, PinStateMachine};
use crate::dbus::PropertyMap;
use crate::types::constants::{modem_keys, ofono};
use crate::util::utils::{
    as_bool, as_nonempty_string, as_string_list, pin_required, retries,
};

/// Identifies one SIM attachment of one modem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SimTicket {
    pub(crate) path: OwnedObjectPath,
    pub(crate) generation: u64,
}

/// Follow-up required after a modem property change.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ModemChange {
    /// The modem is not tracked.
    Unknown,
    /// Merged; no subscription change.
    Applied,
    /// The SIM manager appeared: subscribe and fetch.
    AttachSim(SimTicket),
    /// The SIM manager went away: drop its subscription.
    DetachSim(OwnedObjectPath),
}

#[derive(Debug)]
struct ModemEntry {
    modem: Modem,
    sim_generation: u64,
}

#[derive(Debug, Default)]
struct Aggregates {
    present_sims: usize,
    required_pins: HashMap<OwnedObjectPath, PinType>,
    locked_puks: HashMap<OwnedObjectPath, PinType>,
}

impl Aggregates {
    fn set_present(&mut self, modem: &mut Modem, present: bool) {
        if modem.sim_present == present {
            return;
        }
        modem.sim_present = present;
        if present {
            self.present_sims += 1;
        } else {
            self.present_sims = self.present_sims.saturating_sub(1);
        }
    }

    fn set_pin_required(&mut self, modem: &mut Modem, kind: Option<PinType>) {
        self.required_pins.remove(&modem.path);
        self.locked_puks.remove(&modem.path);

        match &kind {
            Some(k) if k.is_puk() => {
                self.locked_puks.insert(modem.path.clone(), k.clone());
            }
            Some(k) => {
                self.required_pins.insert(modem.path.clone(), k.clone());
            }
            None => {}
        }

        modem.pin_required = kind;
        modem.pin.sync(modem.pin_required.as_ref(), &modem.retries);
    }

    fn set_retries(&mut self, modem: &mut Modem, retries: HashMap<PinType, u8>) {
        modem.retries = retries;
        modem.pin.sync(modem.pin_required.as_ref(), &modem.retries);
    }

    fn clear_sim(&mut self, modem: &mut Modem) {
        self.set_present(modem, false);
        modem.retries.clear();
        modem.subscriber_identity = None;
        self.set_pin_required(modem, None);
        modem.pin = PinStateMachine::default();
    }
}

#[derive(Debug, Default)]
pub(crate) struct ModemRegistry {
    modems: BTreeMap<String, ModemEntry>,
    aggregates: Aggregates,
    next_generation: u64,
}

impl ModemRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Tracks a modem reported by `GetModems` or `ModemAdded`.
    ///
    /// Re-adding a known modem refreshes its properties.
    pub(crate) fn add_modem(&mut self, path: OwnedObjectPath, properties: &PropertyMap) -> ModemChange {
        let key = path.to_string();
        if !self.modems.contains_key(&key) {
            debug!("Modem added: {path}");
            self.modems.insert(
                key.clone(),
                ModemEntry {
                    modem: Modem::new(path.clone()),
                    sim_generation: 0,
                },
            );
        }

        let mut change = ModemChange::Applied;
        for (name, value) in properties {
            match self.apply_modem_change(&path, name, value) {
                ModemChange::Applied | ModemChange::Unknown => {}
                other => change = other,
            }
        }
        change
    }

    /// Merges a re-read of a modem that is still tracked.
    ///
    /// A modem removed in the meantime stays removed.
    pub(crate) fn refresh_modem(&mut self, path: &OwnedObjectPath, properties: &PropertyMap) -> ModemChange {
        if !self.modems.contains_key(path.as_str()) {
            trace!("Dropping re-read of removed modem {path}");
            return ModemChange::Unknown;
        }
        self.add_modem(path.clone(), properties)
    }

    /// Forgets a modem and everything it contributed to the aggregates.
    pub(crate) fn remove_modem(&mut self, path: &OwnedObjectPath) -> bool {
        let Some(mut entry) = self.modems.remove(path.as_str()) else {
            trace!("ModemRemoved for unknown modem {path}");
            return false;
        };
        self.aggregates.clear_sim(&mut entry.modem);
        debug!("Modem removed: {path}");
        true
    }

    /// Merges one `org.ofono.Modem` property.
    pub(crate) fn apply_modem_change(
        &mut self,
        path: &OwnedObjectPath,
        key: &str,
        value: &Value<'_>,
    ) -> ModemChange {
        let Some(entry) = self.modems.get_mut(path.as_str()) else {
            trace!("Modem PropertyChanged {key} for unknown modem {path}");
            return ModemChange::Unknown;
        };
        let modem = &mut entry.modem;

        match key {
            modem_keys::NAME => modem.name = as_nonempty_string(value),
            modem_keys::MANUFACTURER => modem.manufacturer = as_nonempty_string(value),
            modem_keys::MODEL => modem.model = as_nonempty_string(value),
            modem_keys::POWERED => modem.powered = as_bool(value).unwrap_or(false),
            modem_keys::ONLINE => modem.online = as_bool(value).unwrap_or(false),
            modem_keys::INTERFACES => {
                let interfaces = as_string_list(value).unwrap_or_default();
                let has = |iface: &str| interfaces.iter().any(|i| i == iface);
                modem.has_connection_manager = has(ofono::CONNECTION_MANAGER_INTERFACE);
                let has_sim = has(ofono::SIM_MANAGER_INTERFACE);
                modem.interfaces = interfaces;
                return self.set_sim_capability(path, has_sim);
            }
            _ => trace!("Ignoring modem property {key}"),
        }
        ModemChange::Applied
    }

    /// Guarded attach/detach of the SIM manager.
    fn set_sim_capability(&mut self, path: &OwnedObjectPath, has_sim: bool) -> ModemChange {
        self.next_generation += 1;
        let generation = self.next_generation;

        let Some(entry) = self.modems.get_mut(path.as_str()) else {
            return ModemChange::Unknown;
        };

        match (entry.modem.has_sim_manager, has_sim) {
            (false, true) => {
                entry.modem.has_sim_manager = true;
                entry.sim_generation = generation;
                debug!("SIM manager attached on {path}");
                ModemChange::AttachSim(SimTicket {
                    path: path.clone(),
                    generation,
                })
            }
            (true, false) => {
                entry.modem.has_sim_manager = false;
                self.aggregates.clear_sim(&mut entry.modem);
                debug!("SIM manager detached from {path}");
                ModemChange::DetachSim(path.clone())
            }
            _ => ModemChange::Applied,
        }
    }

    /// Applies a full SimManager `GetProperties` reply.
    ///
    /// Returns `false` if the SIM was detached (or re-attached) since the
    /// fetch was issued.
    pub(crate) fn complete_sim_fetch(&mut self, ticket: &SimTicket, properties: &PropertyMap) -> bool {
        let Some(entry) = self.modems.get_mut(ticket.path.as_str()) else {
            trace!("Dropping SIM fetch for removed modem {}", ticket.path);
            return false;
        };
        if !entry.modem.has_sim_manager || entry.sim_generation != ticket.generation {
            trace!("Dropping stale SIM fetch for {}", ticket.path);
            return false;
        }

        let modem = &mut entry.modem;
        let aggregates = &mut self.aggregates;

        let present = properties
            .get(modem_keys::PRESENT)
            .and_then(|v| as_bool(v))
            .unwrap_or(false);
        aggregates.set_present(modem, present);

        modem.subscriber_identity = properties
            .get(modem_keys::SUBSCRIBER_IDENTITY)
            .and_then(|v| as_nonempty_string(v));

        let counts = properties
            .get(modem_keys::RETRIES)
            .map(|v| retries(v))
            .unwrap_or_default();
        aggregates.set_retries(modem, counts);

        let required = properties
            .get(modem_keys::PIN_REQUIRED)
            .and_then(|v| pin_required(v));
        aggregates.set_pin_required(modem, required);

        true
    }

    /// Merges one `org.ofono.SimManager` property.
    ///
    /// Ignored unless the SIM manager is attached.
    pub(crate) fn apply_sim_change(
        &mut self,
        path: &OwnedObjectPath,
        key: &str,
        value: &Value<'_>,
    ) -> bool {
        let Some(entry) = self.modems.get_mut(path.as_str()) else {
            trace!("SIM PropertyChanged {key} for unknown modem {path}");
            return false;
        };
        if !entry.modem.has_sim_manager {
            trace!("SIM PropertyChanged {key} on {path} without SIM manager");
            return false;
        }

        let modem = &mut entry.modem;
        let aggregates = &mut self.aggregates;

        match key {
            modem_keys::PRESENT => aggregates.set_present(modem, as_bool(value).unwrap_or(false)),
            modem_keys::PIN_REQUIRED => aggregates.set_pin_required(modem, pin_required(value)),
            modem_keys::RETRIES => aggregates.set_retries(modem, retries(value)),
            modem_keys::SUBSCRIBER_IDENTITY => {
                modem.subscriber_identity = as_nonempty_string(value)
            }
            _ => {
                trace!("Ignoring SIM property {key}");
                return false;
            }
        }
        true
    }

    /// PIN state machine of a modem with an attached SIM manager.
    pub(crate) fn pin_mut(&mut self, path: &str) -> Result<&mut PinStateMachine> {
        let entry = self
            .modems
            .get_mut(path)
            .ok_or_else(|| ConnectivityError::UnknownModem(path.to_string()))?;
        if !entry.modem.has_sim_manager {
            return Err(ConnectivityError::NoSimManager(path.to_string()));
        }
        Ok(&mut entry.modem.pin)
    }

    /// Records the outcome of a SIM manager call.
    pub(crate) fn complete_pin(
        &mut self,
        path: &str,
        request: &PinRequest,
        result: &Result<()>,
    ) -> Option<PinErrorKind> {
        match self.modems.get_mut(path) {
            Some(entry) => entry.modem.pin.complete(request, result),
            None => result.as_ref().err().map(PinErrorKind::classify),
        }
    }

    pub(crate) fn get(&self, path: &str) -> Option<&Modem> {
        self.modems.get(path).map(|e| &e.modem)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Modem> {
        self.modems.values().map(|e| &e.modem)
    }

    pub(crate) fn len(&self) -> usize {
        self.modems.len()
    }

    pub(crate) fn present_sims(&self) -> usize {
        self.aggregates.present_sims
    }

    pub(crate) fn required_pins(&self) -> &HashMap<OwnedObjectPath, PinType> {
        &self.aggregates.required_pins
    }

    pub(crate) fn locked_puks(&self) -> &HashMap<OwnedObjectPath, PinType> {
        &self.aggregates.locked_puks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pin::PinState;
    use zvariant::OwnedValue;

    fn path(s: &str) -> OwnedObjectPath {
        OwnedObjectPath::try_from(format!("/{s}")).unwrap()
    }

    fn owned(v: Value<'_>) -> OwnedValue {
        v.try_to_owned().unwrap()
    }

    fn interfaces(list: &[&str]) -> Value<'static> {
        Value::from(list.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    fn retries_value(pairs: &[(&'static str, u8)]) -> Value<'static> {
        let map: HashMap<&'static str, u8> = pairs.iter().cloned().collect();
        Value::from(map)
    }

    fn with_sim(registry: &mut ModemRegistry, name: &str) -> SimTicket {
        let p = path(name);
        registry.add_modem(p.clone(), &PropertyMap::new());
        match registry.apply_modem_change(&p, "Interfaces", &interfaces(&[ofono::SIM_MANAGER_INTERFACE])) {
            ModemChange::AttachSim(ticket) => ticket,
            other => panic!("expected attach, got {other:?}"),
        }
    }

    fn assert_counter_consistent(registry: &ModemRegistry) {
        let counted = registry.iter().filter(|m| m.sim_present).count();
        assert_eq!(registry.present_sims(), counted);
    }

    #[test]
    fn test_add_modem_with_sim_interface_attaches() {
        let mut registry = ModemRegistry::new();
        let mut props = PropertyMap::new();
        props.insert("Manufacturer".into(), owned(Value::from("Quectel")));
        props.insert(
            "Interfaces".into(),
            owned(interfaces(&[
                ofono::SIM_MANAGER_INTERFACE,
                ofono::CONNECTION_MANAGER_INTERFACE,
            ])),
        );

        let change = registry.add_modem(path("quectel_0"), &props);
        assert!(matches!(change, ModemChange::AttachSim(_)));

        let modem = registry.get("/quectel_0").unwrap();
        assert!(modem.has_sim_manager);
        assert!(modem.has_connection_manager);
        assert_eq!(modem.manufacturer.as_deref(), Some("Quectel"));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut registry = ModemRegistry::new();
        let p = path("m");
        with_sim(&mut registry, "m");
        let again =
            registry.apply_modem_change(&p, "Interfaces", &interfaces(&[ofono::SIM_MANAGER_INTERFACE]));
        assert_eq!(again, ModemChange::Applied);
    }

    #[test]
    fn test_refresh_does_not_resurrect_removed_modem() {
        let mut registry = ModemRegistry::new();
        let p = path("modem0");
        registry.add_modem(p.clone(), &PropertyMap::new());
        assert!(registry.remove_modem(&p));

        let mut props = PropertyMap::new();
        props.insert(
            "Interfaces".into(),
            owned(interfaces(&[ofono::SIM_MANAGER_INTERFACE])),
        );
        assert_eq!(registry.refresh_modem(&p, &props), ModemChange::Unknown);
        assert!(registry.get(p.as_str()).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_refresh_merges_into_tracked_modem() {
        let mut registry = ModemRegistry::new();
        let p = path("modem0");
        registry.add_modem(p.clone(), &PropertyMap::new());

        let mut props = PropertyMap::new();
        props.insert("Powered".into(), owned(Value::from(true)));
        props.insert(
            "Interfaces".into(),
            owned(interfaces(&[ofono::SIM_MANAGER_INTERFACE])),
        );
        assert!(matches!(
            registry.refresh_modem(&p, &props),
            ModemChange::AttachSim(_)
        ));
        assert!(registry.get(p.as_str()).unwrap().powered);
    }

    #[test]
    fn test_present_toggle_keeps_counter_exact() {
        let mut registry = ModemRegistry::new();
        let ticket = with_sim(&mut registry, "m");
        let mut props = PropertyMap::new();
        props.insert("Present".into(), owned(Value::from(true)));
        assert!(registry.complete_sim_fetch(&ticket, &props));
        assert_eq!(registry.present_sims(), 1);

        registry.apply_sim_change(&ticket.path, "Present", &Value::from(false));
        assert_eq!(registry.present_sims(), 0);
        registry.apply_sim_change(&ticket.path, "Present", &Value::from(true));
        assert_eq!(registry.present_sims(), 1);

        // Repeating the same value must not double count.
        registry.apply_sim_change(&ticket.path, "Present", &Value::from(true));
        assert_eq!(registry.present_sims(), 1);
        assert_counter_consistent(&registry);
    }

    #[test]
    fn test_detach_clears_sim_state() {
        let mut registry = ModemRegistry::new();
        let ticket = with_sim(&mut registry, "m");
        let mut props = PropertyMap::new();
        props.insert("Present".into(), owned(Value::from(true)));
        props.insert("PinRequired".into(), owned(Value::from("pin")));
        props.insert("Retries".into(), owned(retries_value(&[("pin", 3)])));
        registry.complete_sim_fetch(&ticket, &props);
        assert_eq!(registry.required_pins().get(&ticket.path), Some(&PinType::Pin));

        let change = registry.apply_modem_change(&ticket.path, "Interfaces", &interfaces(&[]));
        assert_eq!(change, ModemChange::DetachSim(ticket.path.clone()));

        let modem = registry.get(ticket.path.as_str()).unwrap();
        assert!(!modem.sim_present);
        assert!(modem.pin_required.is_none());
        assert!(modem.retries.is_empty());
        assert_eq!(registry.present_sims(), 0);
        assert!(registry.required_pins().is_empty());

        // Late completions and signals for the old attachment are ignored.
        assert!(!registry.complete_sim_fetch(&ticket, &props));
        assert!(!registry.apply_sim_change(&ticket.path, "Present", &Value::from(true)));
        assert_eq!(registry.present_sims(), 0);
    }

    #[test]
    fn test_pin_required_none_normalises() {
        let mut registry = ModemRegistry::new();
        let ticket = with_sim(&mut registry, "m");
        registry.complete_sim_fetch(&ticket, &PropertyMap::new());

        registry.apply_sim_change(&ticket.path, "PinRequired", &Value::from("pin"));
        assert_eq!(registry.required_pins().len(), 1);

        registry.apply_sim_change(&ticket.path, "PinRequired", &Value::from("none"));
        assert!(registry.required_pins().is_empty());
        assert!(registry.get(ticket.path.as_str()).unwrap().pin_required.is_none());
    }

    #[test]
    fn test_puk_moves_between_aggregates() {
        let mut registry = ModemRegistry::new();
        let ticket = with_sim(&mut registry, "m");
        registry.complete_sim_fetch(&ticket, &PropertyMap::new());

        registry.apply_sim_change(&ticket.path, "PinRequired", &Value::from("pin"));
        registry.apply_sim_change(&ticket.path, "PinRequired", &Value::from("puk"));
        assert!(registry.required_pins().is_empty());
        assert_eq!(registry.locked_puks().get(&ticket.path), Some(&PinType::Puk));
        assert_eq!(
            registry.get(ticket.path.as_str()).unwrap().pin.state(),
            &PinState::PukRequired(PinType::Puk)
        );

        registry.apply_sim_change(&ticket.path, "Retries", &retries_value(&[("puk", 0)]));
        assert_eq!(
            registry.get(ticket.path.as_str()).unwrap().pin.state(),
            &PinState::Locked(PinType::Puk)
        );
    }

    #[test]
    fn test_retries_are_replaced_not_merged() {
        let mut registry = ModemRegistry::new();
        let ticket = with_sim(&mut registry, "m");
        registry.complete_sim_fetch(&ticket, &PropertyMap::new());

        registry.apply_sim_change(&ticket.path, "Retries", &retries_value(&[("pin", 3), ("puk", 10)]));
        registry.apply_sim_change(&ticket.path, "Retries", &retries_value(&[("pin", 2)]));

        let modem = registry.get(ticket.path.as_str()).unwrap();
        assert_eq!(modem.retries_for(&PinType::Pin), Some(2));
        assert_eq!(modem.retries_for(&PinType::Puk), None);
    }

    #[test]
    fn test_remove_modem_updates_aggregates() {
        let mut registry = ModemRegistry::new();
        let a = with_sim(&mut registry, "a");
        let b = with_sim(&mut registry, "b");
        let mut props = PropertyMap::new();
        props.insert("Present".into(), owned(Value::from(true)));
        props.insert("PinRequired".into(), owned(Value::from("pin")));
        registry.complete_sim_fetch(&a, &props);
        registry.complete_sim_fetch(&b, &props);
        assert_eq!(registry.present_sims(), 2);

        assert!(registry.remove_modem(&a.path));
        assert_eq!(registry.present_sims(), 1);
        assert_eq!(registry.required_pins().len(), 1);
        assert!(!registry.remove_modem(&a.path));
        assert_counter_consistent(&registry);
    }

    #[test]
    fn test_reattach_invalidates_old_ticket() {
        let mut registry = ModemRegistry::new();
        let first = with_sim(&mut registry, "m");
        registry.apply_modem_change(&first.path, "Interfaces", &interfaces(&[]));
        let second = match registry.apply_modem_change(
            &first.path,
            "Interfaces",
            &interfaces(&[ofono::SIM_MANAGER_INTERFACE]),
        ) {
            ModemChange::AttachSim(t) => t,
            other => panic!("expected attach, got {other:?}"),
        };

        let mut props = PropertyMap::new();
        props.insert("Present".into(), owned(Value::from(true)));
        assert!(!registry.complete_sim_fetch(&first, &props));
        assert!(registry.complete_sim_fetch(&second, &props));
        assert_eq!(registry.present_sims(), 1);
    }

    #[test]
    fn test_pin_mut_requires_sim_manager() {
        let mut registry = ModemRegistry::new();
        registry.add_modem(path("bare"), &PropertyMap::new());
        assert!(matches!(
            registry.pin_mut("/bare"),
            Err(ConnectivityError::NoSimManager(_))
        ));
        assert!(matches!(
            registry.pin_mut("/nope"),
            Err(ConnectivityError::UnknownModem(_))
        ));
    }
}
