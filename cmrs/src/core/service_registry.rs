//! Ordered cache of ConnMan services.
//!
//! The Manager's `Services` property is the authority on which services
//! exist and in which order. [`ServiceRegistry::reconcile`] brings the local
//! collection in line with it; property fetches and `PropertyChanged`
//! signals then fill in each entry independently.
//!
//! Fetches complete in any order and may outlive the entity they were issued
//! for. Each fetch carries a [`FetchTicket`]; a completion whose ticket no
//! longer matches a tracked entry is dropped.
//!
//! A refetch reply and the signal stream travel separately, so signals that
//! arrive while a refetch is outstanding are kept and replayed on top of the
//! reply.

use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::api::models::{Security, Service, ServiceState, ServiceType};
use crate::dbus::PropertyMap;
use crate::types::constants::service_keys;
use crate::util::utils::{
    as_bool, as_dict, as_nonempty_string, as_string, as_string_list, as_u8, ip_settings,
    proxy_settings,
};

/// Identifies one property fetch for one incarnation of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FetchTicket {
    pub(crate) path: OwnedObjectPath,
    pub(crate) generation: u64,
}

/// What `reconcile` changed.
#[derive(Debug, Default)]
pub(crate) struct ReconcileOutcome {
    /// New entries; each needs a subscription and a fetch.
    pub(crate) added: Vec<FetchTicket>,
    /// Entries dropped; their subscriptions must go.
    pub(crate) removed: Vec<OwnedObjectPath>,
    /// Whether any surviving entry changed position.
    pub(crate) reordered: bool,
}

impl ReconcileOutcome {
    pub(crate) fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.reordered
    }
}

/// Follow-up required after a `PropertyChanged`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PropertyChange {
    /// The path is not tracked; nothing changed.
    Unknown,
    /// Merged into the entry.
    Applied,
    /// The entry must be fetched again in full.
    Refetch(FetchTicket),
    /// A VPN went idle or failed; its provider record should be removed.
    RemoveProvider(OwnedObjectPath),
}

#[derive(Debug)]
struct Entry {
    service: Service,
    generation: u64,
    refetching: bool,
    changed_since_refetch: Vec<(String, OwnedValue)>,
}

impl Entry {
    fn new(service: Service, generation: u64) -> Self {
        Self {
            service,
            generation,
            refetching: false,
            changed_since_refetch: Vec::new(),
        }
    }

    /// Keeps the latest value per key until the refetch reply lands.
    fn record_change(&mut self, key: &str, value: &Value<'_>) {
        self.changed_since_refetch.retain(|(k, _)| k != key);
        match value.try_to_owned() {
            Ok(value) => self.changed_since_refetch.push((key.to_string(), value)),
            Err(e) => trace!("Cannot keep {key} for replay: {e}"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ServiceRegistry {
    order: Vec<OwnedObjectPath>,
    entries: HashMap<OwnedObjectPath, Entry>,
    next_generation: u64,
    last_active: Option<OwnedObjectPath>,
}

impl ServiceRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Matches the collection to `paths`, in that order.
    ///
    /// Duplicate paths keep their first position.
    pub(crate) fn reconcile(&mut self, paths: &[OwnedObjectPath]) -> ReconcileOutcome {
        let mut seen = HashSet::with_capacity(paths.len());
        let new_order: Vec<OwnedObjectPath> = paths
            .iter()
            .filter(|p| seen.insert((*p).clone()))
            .cloned()
            .collect();

        let mut outcome = ReconcileOutcome::default();

        for path in &self.order {
            if !seen.contains(path) {
                outcome.removed.push(path.clone());
            }
        }
        for path in &outcome.removed {
            self.entries.remove(path);
            if self.last_active.as_ref() == Some(path) {
                self.last_active = None;
            }
            debug!("Service removed: {path}");
        }

        for (index, path) in new_order.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(path) {
                if entry.service.index != index {
                    entry.service.index = index;
                    outcome.reordered = true;
                }
                continue;
            }

            let generation = self.bump_generation();
            self.entries.insert(
                path.clone(),
                Entry::new(Service::provisional(path.clone(), index), generation),
            );
            outcome.added.push(FetchTicket {
                path: path.clone(),
                generation,
            });
            debug!("Service added at {index}: {path}");
        }

        self.order = new_order;
        outcome
    }

    /// Applies a full `GetProperties` reply.
    ///
    /// Returns `false` if the ticket is stale. The entry is replaced as a
    /// whole; a locally echoed passphrase survives when the reply has none
    /// and does not ask for a new one. Signals received since a refetch was
    /// issued are applied again on top of the reply.
    pub(crate) fn complete_fetch(&mut self, ticket: &FetchTicket, properties: &PropertyMap) -> bool {
        let Some(entry) = self.entries.get_mut(&ticket.path) else {
            trace!("Dropping fetch for removed service {}", ticket.path);
            return false;
        };
        if entry.generation != ticket.generation {
            trace!("Dropping stale fetch for {}", ticket.path);
            return false;
        }

        let mut service = Service::provisional(ticket.path.clone(), entry.service.index);
        for (key, value) in properties {
            apply_key(&mut service, key, value);
        }
        if service.passphrase.is_none() && !service.passphrase_required {
            service.passphrase = entry.service.passphrase.take();
        }
        for (key, value) in entry.changed_since_refetch.drain(..) {
            apply_key(&mut service, &key, &value);
        }
        entry.refetching = false;
        service.populated = true;

        let connected = service.is_connected();
        entry.service = service;
        if connected {
            self.last_active = Some(ticket.path.clone());
        }
        true
    }

    /// Merges one `PropertyChanged` into the entry at `path`.
    pub(crate) fn apply_property_change(
        &mut self,
        path: &OwnedObjectPath,
        key: &str,
        value: &Value<'_>,
    ) -> PropertyChange {
        let generation = self.next_generation + 1;
        let Some(entry) = self.entries.get_mut(path) else {
            trace!("PropertyChanged {key} for unknown service {path}");
            return PropertyChange::Unknown;
        };

        match key {
            service_keys::PASSPHRASE_REQUIRED | service_keys::SETUP_REQUIRED => {
                apply_key(&mut entry.service, key, value);
                if key == service_keys::PASSPHRASE_REQUIRED && entry.service.passphrase_required {
                    entry.service.passphrase = None;
                }
                entry.generation = generation;
                entry.refetching = true;
                entry.changed_since_refetch.clear();
                self.next_generation = generation;
                PropertyChange::Refetch(FetchTicket {
                    path: path.clone(),
                    generation,
                })
            }
            _ if entry.refetching => {
                entry.record_change(key, value);
                self.merge_change(path, key, value)
            }
            _ => self.merge_change(path, key, value),
        }
    }

    fn merge_change(&mut self, path: &OwnedObjectPath, key: &str, value: &Value<'_>) -> PropertyChange {
        let Some(entry) = self.entries.get_mut(path) else {
            return PropertyChange::Unknown;
        };

        match key {
            service_keys::STATE => {
                let old = entry.service.state;
                apply_key(&mut entry.service, key, value);
                let new = entry.service.state;

                if new.is_connected() {
                    self.last_active = Some(path.clone());
                }
                if entry.service.is_vpn()
                    && new != old
                    && matches!(new, ServiceState::Idle | ServiceState::Failure)
                {
                    debug!("VPN {path} went {new}, removing provider");
                    return PropertyChange::RemoveProvider(path.clone());
                }
                PropertyChange::Applied
            }
            _ => {
                if !apply_key(&mut entry.service, key, value) {
                    trace!("Ignoring service property {key}");
                }
                PropertyChange::Applied
            }
        }
    }

    /// Drops a locally echoed passphrase, e.g. after the service was forgotten.
    pub(crate) fn forget_passphrase(&mut self, path: &OwnedObjectPath) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) => entry.service.passphrase.take().is_some(),
            None => false,
        }
    }

    /// Stores a passphrase the user just submitted.
    pub(crate) fn echo_passphrase(&mut self, path: &OwnedObjectPath, passphrase: &str) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) => {
                entry.service.passphrase = Some(passphrase.to_string());
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, path: &str) -> Option<&Service> {
        self.order
            .iter()
            .find(|p| p.as_str() == path)
            .and_then(|p| self.entries.get(p))
            .map(|e| &e.service)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, path: &OwnedObjectPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Services in the Manager's order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Service> {
        self.order
            .iter()
            .filter_map(|p| self.entries.get(p).map(|e| &e.service))
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn last_active(&self) -> Option<&OwnedObjectPath> {
        self.last_active.as_ref()
    }

    pub(crate) fn snapshot(&self) -> Vec<Service> {
        self.iter().cloned().collect()
    }
}

/// Writes one property into `service`; returns `false` for unknown keys.
fn apply_key(service: &mut Service, key: &str, value: &Value<'_>) -> bool {
    match key {
        service_keys::NAME => service.name = as_nonempty_string(value),
        service_keys::TYPE => service.service_type = as_string(value).map(|s| ServiceType::from(s.as_str())),
        service_keys::STATE => {
            service.state = as_string(value)
                .map(|s| ServiceState::from(s.as_str()))
                .unwrap_or(ServiceState::Unknown)
        }
        service_keys::FAVORITE => service.favorite = as_bool(value).unwrap_or(false),
        service_keys::AUTO_CONNECT => service.auto_connect = as_bool(value).unwrap_or(false),
        service_keys::STRENGTH => service.strength = as_u8(value),
        service_keys::SECURITY => {
            service.security = as_string_list(value)
                .unwrap_or_default()
                .iter()
                .map(|s| Security::from(s.as_str()))
                .collect()
        }
        service_keys::PASSPHRASE => service.passphrase = as_nonempty_string(value),
        service_keys::PASSPHRASE_REQUIRED => {
            service.passphrase_required = as_bool(value).unwrap_or(false)
        }
        service_keys::SETUP_REQUIRED => service.setup_required = as_bool(value).unwrap_or(false),
        service_keys::IPV4 => service.ipv4.set_effective(ip_settings(value)),
        service_keys::IPV4_CONFIGURATION => service.ipv4.set_configured(ip_settings(value)),
        service_keys::IPV6 => service.ipv6.set_effective(ip_settings(value)),
        service_keys::IPV6_CONFIGURATION => service.ipv6.set_configured(ip_settings(value)),
        service_keys::NAMESERVERS => service.nameservers.set_effective(nameservers(value)),
        service_keys::NAMESERVERS_CONFIGURATION => {
            service.nameservers.set_configured(nameservers(value))
        }
        service_keys::PROXY => service.proxy.set_effective(proxy_settings(value)),
        service_keys::PROXY_CONFIGURATION => service.proxy.set_configured(proxy_settings(value)),
        service_keys::IMMUTABLE => service.immutable = as_bool(value).unwrap_or(false),
        service_keys::LOGIN_REQUIRED => service.login_required = as_bool(value).unwrap_or(false),
        service_keys::ETHERNET => {
            service.mac_address = as_dict(value)
                .and_then(|d| d.get(service_keys::ADDRESS).and_then(|v| as_nonempty_string(v)))
        }
        service_keys::ERROR => service.error = as_nonempty_string(value),
        _ => return false,
    }
    true
}

fn nameservers(value: &Value<'_>) -> Option<Vec<String>> {
    as_string_list(value).filter(|list| !list.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::IpSettings;
    use std::collections::HashMap;
    use zvariant::OwnedValue;

    fn path(s: &str) -> OwnedObjectPath {
        OwnedObjectPath::try_from(format!("/net/connman/service/{s}")).unwrap()
    }

    fn owned(v: Value<'_>) -> OwnedValue {
        v.try_to_owned().unwrap()
    }

    fn props(pairs: Vec<(&str, Value<'_>)>) -> PropertyMap {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), owned(v)))
            .collect()
    }

    fn ip_dict(method: &str) -> Value<'static> {
        let mut dict: HashMap<&'static str, Value<'static>> = HashMap::new();
        dict.insert("Method", Value::from(method.to_string()));
        Value::from(dict)
    }

    fn order(registry: &ServiceRegistry) -> Vec<(String, usize)> {
        registry
            .iter()
            .map(|s| (s.path.to_string(), s.index))
            .collect()
    }

    #[test]
    fn test_reconcile_creates_provisional_entries_in_order() {
        let mut registry = ServiceRegistry::new();
        let outcome = registry.reconcile(&[path("a"), path("b")]);

        assert_eq!(outcome.added.len(), 2);
        assert_eq!(
            order(&registry),
            vec![
                ("/net/connman/service/a".to_string(), 0),
                ("/net/connman/service/b".to_string(), 1)
            ]
        );
        assert!(registry.iter().all(|s| !s.populated));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut registry = ServiceRegistry::new();
        registry.reconcile(&[path("a"), path("b")]);
        let before = order(&registry);

        let outcome = registry.reconcile(&[path("a"), path("b")]);
        assert!(outcome.is_empty());
        assert_eq!(order(&registry), before);
    }

    #[test]
    fn test_reorder_is_immediate() {
        let mut registry = ServiceRegistry::new();
        let first = registry.reconcile(&[path("a"), path("b")]);

        let outcome = registry.reconcile(&[path("b"), path("a")]);
        assert!(outcome.reordered);
        assert!(outcome.added.is_empty());
        assert_eq!(
            order(&registry),
            vec![
                ("/net/connman/service/b".to_string(), 0),
                ("/net/connman/service/a".to_string(), 1)
            ]
        );

        // Fetches issued before the reorder still land and keep the new index.
        let a = &first.added[0];
        assert!(registry.complete_fetch(a, &props(vec![("Name", Value::from("Home"))])));
        assert_eq!(registry.get(a.path.as_str()).unwrap().index, 1);
    }

    #[test]
    fn test_duplicates_collapse_to_one_entry() {
        let mut registry = ServiceRegistry::new();
        let outcome = registry.reconcile(&[path("a"), path("b"), path("a")]);
        assert_eq!(outcome.added.len(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_removed_fetch_does_not_resurrect() {
        let mut registry = ServiceRegistry::new();
        let outcome = registry.reconcile(&[path("a")]);
        let ticket = outcome.added[0].clone();

        let removal = registry.reconcile(&[]);
        assert_eq!(removal.removed, vec![path("a")]);

        assert!(!registry.complete_fetch(&ticket, &props(vec![("Name", Value::from("Gone"))])));
        assert_eq!(registry.len(), 0);
        assert!(registry.get(ticket.path.as_str()).is_none());
    }

    #[test]
    fn test_stale_ticket_after_readd_is_dropped() {
        let mut registry = ServiceRegistry::new();
        let old = registry.reconcile(&[path("a")]).added[0].clone();
        registry.reconcile(&[]);
        let new = registry.reconcile(&[path("a")]).added[0].clone();
        assert_ne!(old, new);

        assert!(!registry.complete_fetch(&old, &props(vec![("Name", Value::from("Old"))])));
        assert!(registry.complete_fetch(&new, &props(vec![("Name", Value::from("New"))])));
        assert_eq!(
            registry.get(new.path.as_str()).unwrap().name.as_deref(),
            Some("New")
        );
    }

    #[test]
    fn test_fetch_populates_and_replaces_overlays() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("wifi")]).added[0].clone();

        let reply = props(vec![
            ("Name", Value::from("Cafe")),
            ("Type", Value::from("wifi")),
            ("State", Value::from("online")),
            ("Strength", Value::from(72u8)),
            ("Security", Value::from(vec!["psk".to_string(), "wps".to_string()])),
            ("IPv4", ip_dict("dhcp")),
            ("IPv4.Configuration", ip_dict("manual")),
        ]);
        assert!(registry.complete_fetch(&ticket, &reply));

        let service = registry.get(ticket.path.as_str()).unwrap();
        assert!(service.populated);
        assert_eq!(service.service_type, Some(ServiceType::Wifi));
        assert_eq!(service.state, ServiceState::Online);
        assert_eq!(service.strength, Some(72));
        assert_eq!(service.primary_security(), Some(&Security::Psk));
        assert_eq!(
            service.ipv4.resolved().and_then(|s| s.method.as_deref()),
            Some("manual")
        );
        assert_eq!(registry.last_active(), Some(&ticket.path));

        // A later reply without a configured side replaces the pair.
        registry.complete_fetch(&ticket, &props(vec![("IPv4", ip_dict("dhcp"))]));
        let service = registry.get(ticket.path.as_str()).unwrap();
        assert_eq!(service.ipv4.configured(), None);
        assert_eq!(service.ipv4.resolved(), Some(&IpSettings::dhcp()));
    }

    #[test]
    fn test_property_change_for_unknown_path_is_ignored() {
        let mut registry = ServiceRegistry::new();
        let change = registry.apply_property_change(&path("x"), "Name", &Value::from("x"));
        assert_eq!(change, PropertyChange::Unknown);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_configuration_change_updates_configured_side_only() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("eth")]).added[0].clone();
        registry.complete_fetch(&ticket, &props(vec![("IPv4", ip_dict("dhcp"))]));

        registry.apply_property_change(&ticket.path, "IPv4.Configuration", &ip_dict("manual"));
        let service = registry.get(ticket.path.as_str()).unwrap();
        assert_eq!(service.ipv4.effective(), Some(&IpSettings::dhcp()));
        assert_eq!(
            service.ipv4.resolved().and_then(|s| s.method.as_deref()),
            Some("manual")
        );
    }

    #[test]
    fn test_passphrase_required_triggers_refetch() {
        let mut registry = ServiceRegistry::new();
        let first = registry.reconcile(&[path("wifi")]).added[0].clone();

        let change =
            registry.apply_property_change(&first.path, "PassphraseRequired", &Value::from(true));
        let PropertyChange::Refetch(ticket) = change else {
            panic!("expected refetch, got {change:?}");
        };
        assert!(registry.get(first.path.as_str()).unwrap().passphrase_required);

        // The refetch supersedes the original fetch.
        assert!(!registry.complete_fetch(&first, &PropertyMap::new()));
        assert!(registry.complete_fetch(&ticket, &PropertyMap::new()));
    }

    #[test]
    fn test_vpn_failure_removes_provider_once() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("vpn")]).added[0].clone();
        registry.complete_fetch(
            &ticket,
            &props(vec![
                ("Type", Value::from("vpn")),
                ("State", Value::from("ready")),
            ]),
        );

        let change = registry.apply_property_change(&ticket.path, "State", &Value::from("failure"));
        assert_eq!(change, PropertyChange::RemoveProvider(ticket.path.clone()));

        let again = registry.apply_property_change(&ticket.path, "State", &Value::from("failure"));
        assert_eq!(again, PropertyChange::Applied);
    }

    #[test]
    fn test_non_vpn_idle_is_plain_update() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("wifi")]).added[0].clone();
        registry.complete_fetch(
            &ticket,
            &props(vec![
                ("Type", Value::from("wifi")),
                ("State", Value::from("online")),
            ]),
        );
        let change = registry.apply_property_change(&ticket.path, "State", &Value::from("idle"));
        assert_eq!(change, PropertyChange::Applied);
    }

    #[test]
    fn test_echoed_passphrase_survives_refetch() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("wifi")]).added[0].clone();
        assert!(registry.echo_passphrase(&ticket.path, "hunter22"));

        registry.complete_fetch(&ticket, &props(vec![("Name", Value::from("Home"))]));
        assert_eq!(
            registry.get(ticket.path.as_str()).unwrap().passphrase.as_deref(),
            Some("hunter22")
        );
    }

    #[test]
    fn test_last_active_cleared_on_removal() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("a"), path("b")]).added[0].clone();
        registry.apply_property_change(&ticket.path, "State", &Value::from("ready"));
        assert_eq!(registry.last_active(), Some(&ticket.path));

        registry.reconcile(&[path("b")]);
        assert_eq!(registry.last_active(), None);
        assert!(!registry.contains(&ticket.path));
    }

    #[test]
    fn test_ethernet_address() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("eth")]).added[0].clone();
        let mut eth: HashMap<&str, Value<'_>> = HashMap::new();
        eth.insert("Address", Value::from("00:11:22:33:44:55"));
        registry.complete_fetch(&ticket, &props(vec![("Ethernet", Value::from(eth))]));
        assert_eq!(
            registry.get(ticket.path.as_str()).unwrap().mac_address.as_deref(),
            Some("00:11:22:33:44:55")
        );
    }

    #[test]
    fn test_setup_required_triggers_refetch() {
        let mut registry = ServiceRegistry::new();
        let first = registry.reconcile(&[path("cellular")]).added[0].clone();

        let change =
            registry.apply_property_change(&first.path, "SetupRequired", &Value::from(true));
        let PropertyChange::Refetch(ticket) = change else {
            panic!("expected refetch, got {change:?}");
        };
        assert!(registry.get(first.path.as_str()).unwrap().setup_required);
        assert_ne!(ticket.generation, first.generation);

        assert!(!registry.complete_fetch(&first, &PropertyMap::new()));
        assert!(registry.complete_fetch(&ticket, &PropertyMap::new()));
    }

    #[test]
    fn test_signal_newer_than_refetch_reply_wins() {
        let mut registry = ServiceRegistry::new();
        let first = registry.reconcile(&[path("wifi")]).added[0].clone();
        registry.complete_fetch(&first, &props(vec![("State", Value::from("idle"))]));

        let PropertyChange::Refetch(ticket) =
            registry.apply_property_change(&first.path, "PassphraseRequired", &Value::from(true))
        else {
            panic!("expected refetch");
        };
        registry.apply_property_change(&first.path, "State", &Value::from("ready"));

        // The reply was read before the state change reached us.
        assert!(registry.complete_fetch(
            &ticket,
            &props(vec![
                ("State", Value::from("idle")),
                ("Name", Value::from("Cafe")),
            ]),
        ));
        let service = registry.get(first.path.as_str()).unwrap();
        assert_eq!(service.state, ServiceState::Ready);
        assert_eq!(service.name.as_deref(), Some("Cafe"));
        assert_eq!(registry.last_active(), Some(&first.path));

        // Once the reply landed, later fetches are not patched.
        let PropertyChange::Refetch(again) =
            registry.apply_property_change(&first.path, "SetupRequired", &Value::from(false))
        else {
            panic!("expected refetch");
        };
        assert!(registry.complete_fetch(&again, &props(vec![("State", Value::from("idle"))])));
        assert_eq!(
            registry.get(first.path.as_str()).unwrap().state,
            ServiceState::Idle
        );
    }

    #[test]
    fn test_passphrase_request_drops_echoed_passphrase() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("wifi")]).added[0].clone();
        registry.echo_passphrase(&ticket.path, "hunter22");

        let PropertyChange::Refetch(refetch) =
            registry.apply_property_change(&ticket.path, "PassphraseRequired", &Value::from(true))
        else {
            panic!("expected refetch");
        };
        assert!(registry.get(ticket.path.as_str()).unwrap().passphrase.is_none());

        registry.complete_fetch(&refetch, &props(vec![("PassphraseRequired", Value::from(true))]));
        assert!(registry.get(ticket.path.as_str()).unwrap().passphrase.is_none());
    }

    #[test]
    fn test_reply_asking_for_passphrase_does_not_carry_it() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("wifi")]).added[0].clone();
        registry.echo_passphrase(&ticket.path, "hunter22");

        registry.complete_fetch(&ticket, &props(vec![("PassphraseRequired", Value::from(true))]));
        assert!(registry.get(ticket.path.as_str()).unwrap().passphrase.is_none());
    }

    #[test]
    fn test_forget_passphrase() {
        let mut registry = ServiceRegistry::new();
        let ticket = registry.reconcile(&[path("wifi")]).added[0].clone();
        registry.echo_passphrase(&ticket.path, "hunter22");

        assert!(registry.forget_passphrase(&ticket.path));
        assert!(!registry.forget_passphrase(&ticket.path));
        registry.complete_fetch(&ticket, &props(vec![("Name", Value::from("Home"))]));
        assert!(registry.get(ticket.path.as_str()).unwrap().passphrase.is_none());
    }
}
