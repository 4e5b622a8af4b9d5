use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use zvariant::OwnedObjectPath;

use crate::api::overlay::PropertyOverlay;
use crate::core::pin::PinStateMachine;
use crate::types::constants::{ofono_errors, timeouts};

/// Kind of network a ConnMan service represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Wired Ethernet.
    Ethernet,
    /// Wi-Fi network.
    Wifi,
    /// Cellular bearer provided by a modem.
    Cellular,
    /// WiMAX network.
    Wimax,
    /// Bluetooth PAN.
    Bluetooth,
    /// VPN provider.
    Vpn,
    /// Any type string this crate does not model.
    Other(String),
}

impl From<&str> for ServiceType {
    fn from(s: &str) -> Self {
        match s {
            "ethernet" => Self::Ethernet,
            "wifi" => Self::Wifi,
            "cellular" => Self::Cellular,
            "wimax" => Self::Wimax,
            "bluetooth" => Self::Bluetooth,
            "vpn" => Self::Vpn,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ethernet => write!(f, "ethernet"),
            Self::Wifi => write!(f, "wifi"),
            Self::Cellular => write!(f, "cellular"),
            Self::Wimax => write!(f, "wimax"),
            Self::Bluetooth => write!(f, "bluetooth"),
            Self::Vpn => write!(f, "vpn"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Connection state of a service, as reported by ConnMan.
///
/// The daemon owns this state machine; this crate only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ServiceState {
    /// Not connected.
    #[default]
    Idle,
    /// Associating with the network (Wi-Fi, WiMAX).
    Association,
    /// Acquiring IP configuration.
    Configuration,
    /// Connected, connectivity not yet confirmed.
    Ready,
    /// Connected with confirmed internet access.
    Online,
    /// Disconnecting.
    Disconnect,
    /// The last connection attempt failed.
    Failure,
    /// State string this crate does not recognise.
    Unknown,
}

impl From<&str> for ServiceState {
    fn from(s: &str) -> Self {
        match s {
            "idle" => Self::Idle,
            "association" => Self::Association,
            "configuration" => Self::Configuration,
            "ready" => Self::Ready,
            "online" => Self::Online,
            "disconnect" => Self::Disconnect,
            "failure" => Self::Failure,
            _ => Self::Unknown,
        }
    }
}

impl Display for ServiceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Association => write!(f, "association"),
            Self::Configuration => write!(f, "configuration"),
            Self::Ready => write!(f, "ready"),
            Self::Online => write!(f, "online"),
            Self::Disconnect => write!(f, "disconnect"),
            Self::Failure => write!(f, "failure"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl ServiceState {
    /// Returns `true` for `ready` and `online`.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Ready | Self::Online)
    }

    /// Returns `true` while a connection attempt is in progress.
    pub fn is_connecting(self) -> bool {
        matches!(self, Self::Association | Self::Configuration)
    }
}

/// Security method advertised by a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Security {
    /// Open network.
    None,
    /// WEP.
    Wep,
    /// WPA/WPA2 personal.
    Psk,
    /// WPA/WPA2 enterprise (802.1X).
    Ieee8021x,
    /// Wi-Fi Protected Setup is available.
    Wps,
    /// Any method string this crate does not model.
    Other(String),
}

impl From<&str> for Security {
    fn from(s: &str) -> Self {
        match s {
            "none" => Self::None,
            "wep" => Self::Wep,
            "psk" | "wpa" | "rsn" => Self::Psk,
            "ieee8021x" => Self::Ieee8021x,
            "wps" => Self::Wps,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Display for Security {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Wep => write!(f, "wep"),
            Self::Psk => write!(f, "psk"),
            Self::Ieee8021x => write!(f, "ieee8021x"),
            Self::Wps => write!(f, "wps"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One IPv4 or IPv6 record (`IPv4`, `IPv6` and their `.Configuration` twins).
///
/// IPv4 records use `netmask`; IPv6 records use `prefix_length`.
///
/// # Examples
///
/// ```rust
/// use cmrs::IpSettings;
///
/// let dhcp = IpSettings::dhcp();
/// let fixed = IpSettings::manual("192.168.1.20", "255.255.255.0", Some("192.168.1.1"));
/// assert_eq!(fixed.method.as_deref(), Some("manual"));
/// assert_ne!(dhcp, fixed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpSettings {
    /// Method, e.g. `dhcp`, `manual`, `auto`, `off`, `fixed`.
    pub method: Option<String>,
    /// Address in textual form.
    pub address: Option<String>,
    /// IPv4 netmask.
    pub netmask: Option<String>,
    /// IPv6 prefix length.
    pub prefix_length: Option<u8>,
    /// Default gateway.
    pub gateway: Option<String>,
}

impl IpSettings {
    /// IPv4 DHCP.
    pub fn dhcp() -> Self {
        Self::with_method("dhcp")
    }

    /// IPv6 automatic configuration.
    pub fn auto() -> Self {
        Self::with_method("auto")
    }

    /// Disables the address family.
    pub fn off() -> Self {
        Self::with_method("off")
    }

    /// A manual IPv4 configuration.
    pub fn manual(address: &str, netmask: &str, gateway: Option<&str>) -> Self {
        Self {
            method: Some("manual".into()),
            address: Some(address.into()),
            netmask: Some(netmask.into()),
            prefix_length: None,
            gateway: gateway.map(Into::into),
        }
    }

    /// A manual IPv6 configuration.
    pub fn manual_v6(address: &str, prefix_length: u8, gateway: Option<&str>) -> Self {
        Self {
            method: Some("manual".into()),
            address: Some(address.into()),
            netmask: None,
            prefix_length: Some(prefix_length),
            gateway: gateway.map(Into::into),
        }
    }

    fn with_method(method: &str) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    /// Returns `true` if every field is empty.
    pub fn is_empty(&self) -> bool {
        self.method.is_none()
            && self.address.is_none()
            && self.netmask.is_none()
            && self.prefix_length.is_none()
            && self.gateway.is_none()
    }
}

/// Proxy configuration of a service (`Proxy` / `Proxy.Configuration`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxySettings {
    /// `direct`, `auto` or `manual`.
    pub method: Option<String>,
    /// PAC URL for the `auto` method.
    pub url: Option<String>,
    /// Proxy servers for the `manual` method.
    pub servers: Vec<String>,
    /// Hosts that bypass the proxy.
    pub excludes: Vec<String>,
}

impl ProxySettings {
    /// No proxy.
    pub fn direct() -> Self {
        Self {
            method: Some("direct".into()),
            ..Self::default()
        }
    }

    /// Automatic configuration, optionally from a PAC URL.
    pub fn auto(url: Option<&str>) -> Self {
        Self {
            method: Some("auto".into()),
            url: url.map(Into::into),
            ..Self::default()
        }
    }

    /// Explicit proxy servers and bypass list.
    pub fn manual(servers: Vec<String>, excludes: Vec<String>) -> Self {
        Self {
            method: Some("manual".into()),
            url: None,
            servers,
            excludes,
        }
    }

    /// Returns `true` if every field is empty.
    pub fn is_empty(&self) -> bool {
        self.method.is_none() && self.url.is_none() && self.servers.is_empty() && self.excludes.is_empty()
    }
}

/// A ConnMan service: one way of getting online.
///
/// Services are created provisionally as soon as their path appears in the
/// Manager's `Services` list, so every field except `path` and `index` may
/// still be empty until the first property fetch completes (`populated`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// D-Bus object path; the unique key.
    pub path: OwnedObjectPath,
    /// Position in the Manager's list (priority order).
    pub index: usize,
    /// Whether a full property fetch has completed.
    pub populated: bool,
    /// Display name (SSID for Wi-Fi).
    pub name: Option<String>,
    /// Technology of the service.
    pub service_type: Option<ServiceType>,
    /// Connection state.
    pub state: ServiceState,
    /// Whether the service has been connected before and is remembered.
    pub favorite: bool,
    /// Whether ConnMan connects to it automatically.
    pub auto_connect: bool,
    /// Signal strength (0-100) for radio technologies.
    pub strength: Option<u8>,
    /// Advertised security methods.
    pub security: Vec<Security>,
    /// Stored passphrase, if ConnMan exposes it or the user just entered it.
    pub passphrase: Option<String>,
    /// Whether connecting needs a passphrase.
    pub passphrase_required: bool,
    /// Whether the service needs configuration (e.g. cellular APN) first.
    pub setup_required: bool,
    /// IPv4 addressing.
    pub ipv4: PropertyOverlay<IpSettings>,
    /// IPv6 addressing.
    pub ipv6: PropertyOverlay<IpSettings>,
    /// DNS servers.
    pub nameservers: PropertyOverlay<Vec<String>>,
    /// Proxy configuration.
    pub proxy: PropertyOverlay<ProxySettings>,
    /// Whether the configuration is read-only (provisioned).
    pub immutable: bool,
    /// Whether a captive-portal login is required.
    pub login_required: bool,
    /// Hardware address of the underlying interface.
    pub mac_address: Option<String>,
    /// Last error reported by ConnMan for this service.
    pub error: Option<String>,
}

impl Service {
    /// Creates an empty entry at the given position.
    pub fn provisional(path: OwnedObjectPath, index: usize) -> Self {
        Self {
            path,
            index,
            populated: false,
            name: None,
            service_type: None,
            state: ServiceState::Idle,
            favorite: false,
            auto_connect: false,
            strength: None,
            security: Vec::new(),
            passphrase: None,
            passphrase_required: false,
            setup_required: false,
            ipv4: PropertyOverlay::default(),
            ipv6: PropertyOverlay::default(),
            nameservers: PropertyOverlay::default(),
            proxy: PropertyOverlay::default(),
            immutable: false,
            login_required: false,
            mac_address: None,
            error: None,
        }
    }

    /// Returns `true` if this is a VPN service.
    pub fn is_vpn(&self) -> bool {
        matches!(self.service_type, Some(ServiceType::Vpn))
    }

    /// Returns `true` if this is a cellular service.
    pub fn is_cellular(&self) -> bool {
        matches!(self.service_type, Some(ServiceType::Cellular))
    }

    /// Returns `true` if the service is `ready` or `online`.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// The most relevant security method (WPS is only an add-on).
    pub fn primary_security(&self) -> Option<&Security> {
        self.security
            .iter()
            .find(|s| **s != Security::Wps)
            .or_else(|| self.security.first())
    }
}

bitflags! {
    /// Set of ConnMan technologies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Technologies: u32 {
        /// Wired Ethernet.
        const ETHERNET = 1 << 0;
        /// Wi-Fi.
        const WIFI = 1 << 1;
        /// Cellular.
        const CELLULAR = 1 << 2;
        /// WiMAX.
        const WIMAX = 1 << 3;
        /// Bluetooth.
        const BLUETOOTH = 1 << 4;
        /// VPN.
        const VPN = 1 << 5;
    }
}

impl Technologies {
    /// Maps one technology name to its flag.
    pub fn from_technology(name: &str) -> Option<Self> {
        match name {
            "ethernet" => Some(Self::ETHERNET),
            "wifi" => Some(Self::WIFI),
            "cellular" => Some(Self::CELLULAR),
            "wimax" => Some(Self::WIMAX),
            "bluetooth" => Some(Self::BLUETOOTH),
            "vpn" => Some(Self::VPN),
            _ => None,
        }
    }

    /// Collects a list of names, ignoring unknown ones.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|n| Self::from_technology(n.as_ref()))
            .fold(Self::empty(), |acc, t| acc | t)
    }
}

/// Global ConnMan state from the Manager object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagerState {
    /// Whether ConnMan is reachable and reported its properties.
    pub available: bool,
    /// Flight mode.
    pub offline_mode: bool,
    /// Global state string (`offline`, `idle`, `ready`, `online`).
    pub state: Option<String>,
    /// Technologies with hardware present.
    pub available_technologies: Technologies,
    /// Technologies switched on.
    pub enabled_technologies: Technologies,
    /// Technologies with a connected service.
    pub connected_technologies: Technologies,
}

/// SIM credential kinds understood by oFono.
///
/// PIN-class kinds unlock the SIM or the phone; PUK-class kinds reset a
/// blocked PIN and always carry a new PIN with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinType {
    /// No credential required.
    None,
    /// SIM PIN.
    Pin,
    /// SIM PIN2.
    Pin2,
    /// Phone-to-SIM PIN.
    Phone,
    /// Phone-to-first-SIM PIN.
    FirstPhone,
    /// Network personalisation PIN.
    Net,
    /// Network subset personalisation PIN.
    NetSub,
    /// Service provider personalisation PIN.
    Service,
    /// Corporate personalisation PIN.
    Corp,
    /// SIM PUK.
    Puk,
    /// SIM PUK2.
    Puk2,
    /// Phone-to-first-SIM PUK.
    FirstPhonePuk,
    /// Network personalisation PUK.
    NetPuk,
    /// Network subset personalisation PUK.
    NetSubPuk,
    /// Service provider personalisation PUK.
    ServicePuk,
    /// Corporate personalisation PUK.
    CorpPuk,
    /// Any kind string this crate does not model.
    Other(String),
}

/// PUK kinds and the PIN kind each one resets.
const PUK_RESETS: &[(PinType, PinType)] = &[
    (PinType::Puk, PinType::Pin),
    (PinType::Puk2, PinType::Pin2),
    (PinType::FirstPhonePuk, PinType::FirstPhone),
    (PinType::NetPuk, PinType::Net),
    (PinType::NetSubPuk, PinType::NetSub),
    (PinType::ServicePuk, PinType::Service),
    (PinType::CorpPuk, PinType::Corp),
];

impl From<&str> for PinType {
    fn from(s: &str) -> Self {
        match s {
            "none" => Self::None,
            "pin" => Self::Pin,
            "pin2" => Self::Pin2,
            "phone" => Self::Phone,
            "firstphone" => Self::FirstPhone,
            "net" => Self::Net,
            "netsub" => Self::NetSub,
            "service" => Self::Service,
            "corp" => Self::Corp,
            "puk" => Self::Puk,
            "puk2" => Self::Puk2,
            "firstphonepuk" => Self::FirstPhonePuk,
            "netpuk" => Self::NetPuk,
            "netsubpuk" => Self::NetSubPuk,
            "servicepuk" => Self::ServicePuk,
            "corppuk" => Self::CorpPuk,
            other => Self::Other(other.to_string()),
        }
    }
}

impl PinType {
    /// The wire name used in oFono calls and properties.
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Pin => "pin",
            Self::Pin2 => "pin2",
            Self::Phone => "phone",
            Self::FirstPhone => "firstphone",
            Self::Net => "net",
            Self::NetSub => "netsub",
            Self::Service => "service",
            Self::Corp => "corp",
            Self::Puk => "puk",
            Self::Puk2 => "puk2",
            Self::FirstPhonePuk => "firstphonepuk",
            Self::NetPuk => "netpuk",
            Self::NetSubPuk => "netsubpuk",
            Self::ServicePuk => "servicepuk",
            Self::CorpPuk => "corppuk",
            Self::Other(s) => s,
        }
    }

    /// Returns `true` for PUK-class kinds.
    pub fn is_puk(&self) -> bool {
        PUK_RESETS.iter().any(|(puk, _)| puk == self)
    }

    /// Returns `true` for PIN-class kinds.
    pub fn is_pin(&self) -> bool {
        matches!(
            self,
            Self::Pin
                | Self::Pin2
                | Self::Phone
                | Self::FirstPhone
                | Self::Net
                | Self::NetSub
                | Self::Service
                | Self::Corp
        )
    }

    /// Returns `true` for the SIM-level PIN kinds (`pin`, `pin2`).
    pub fn is_sim_level(&self) -> bool {
        matches!(self, Self::Pin | Self::Pin2)
    }

    /// For a PUK kind, the PIN kind it resets.
    pub fn reset_target(&self) -> Option<PinType> {
        PUK_RESETS
            .iter()
            .find(|(puk, _)| puk == self)
            .map(|(_, pin)| pin.clone())
    }

    /// For a PIN kind, the PUK kind that resets it.
    pub fn unblocking_puk(&self) -> Option<PinType> {
        PUK_RESETS
            .iter()
            .find(|(_, pin)| pin == self)
            .map(|(puk, _)| puk.clone())
    }

    /// Accepted number of digits for this kind, inclusive.
    ///
    /// `None` for kinds whose format is unknown.
    pub fn digit_range(&self) -> Option<(usize, usize)> {
        match self {
            Self::None => Some((0, 8)),
            Self::Pin | Self::Pin2 => Some((4, 8)),
            k if k.is_pin() => Some((4, 16)),
            k if k.is_puk() => Some((8, 8)),
            _ => None,
        }
    }

    /// Checks that `value` is a well-formed credential of this kind.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cmrs::PinType;
    ///
    /// assert!(PinType::Pin.validate("1234").is_ok());
    /// assert!(PinType::Pin.validate("123").is_err());
    /// assert!(PinType::Puk.validate("12345678").is_ok());
    /// assert!(PinType::Puk.validate("1234567").is_err());
    /// assert!(PinType::Pin.validate("12a4").is_err());
    /// ```
    pub fn validate(&self, value: &str) -> Result<(), PinValidationError> {
        if !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(PinValidationError::NonDecimal);
        }

        let (min, max) = self
            .digit_range()
            .ok_or_else(|| PinValidationError::UnknownKind(self.as_str().to_string()))?;

        let len = value.len();
        if len < min || len > max {
            return Err(PinValidationError::Length {
                kind: self.as_str().to_string(),
                min,
                max,
                actual: len,
            });
        }

        Ok(())
    }
}

impl Display for PinType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a credential string was rejected before it was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinValidationError {
    /// The input contains something other than decimal digits.
    #[error("credential must contain only decimal digits")]
    NonDecimal,

    /// The input has the wrong number of digits for its kind.
    #[error("{kind} must be {min}-{max} digits, got {actual}")]
    Length {
        /// Credential kind.
        kind: String,
        /// Minimum accepted digits.
        min: usize,
        /// Maximum accepted digits.
        max: usize,
        /// Digits supplied.
        actual: usize,
    },

    /// The kind is not one this crate knows how to validate.
    #[error("unknown credential kind: {0}")]
    UnknownKind(String),
}

/// Classification of a failed PIN/PUK operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinErrorKind {
    /// The daemon rejected the credential itself.
    WrongCredential,
    /// The credential was malformed.
    MalformedCredential,
    /// Any other failure (transport, SIM busy, ...).
    Other,
}

impl PinErrorKind {
    /// Classifies an oFono error name.
    pub fn from_error_name(name: &str) -> Self {
        match name {
            ofono_errors::INCORRECT_PASSWORD | ofono_errors::FAILED => Self::WrongCredential,
            ofono_errors::INVALID_FORMAT | ofono_errors::INVALID_ARGUMENTS => {
                Self::MalformedCredential
            }
            _ => Self::Other,
        }
    }

    /// Classifies any error returned by a PIN operation.
    pub fn classify(err: &ConnectivityError) -> Self {
        match err {
            ConnectivityError::MethodFailed { name, .. } => Self::from_error_name(name),
            ConnectivityError::InvalidPin(_) => Self::MalformedCredential,
            _ => Self::Other,
        }
    }
}

impl Display for PinErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongCredential => write!(f, "wrong credential"),
            Self::MalformedCredential => write!(f, "malformed credential"),
            Self::Other => write!(f, "other error"),
        }
    }
}

/// An oFono modem and its SIM state.
#[derive(Debug, Clone, PartialEq)]
pub struct Modem {
    /// D-Bus object path; the unique key.
    pub path: OwnedObjectPath,
    /// Friendly name, if the driver provides one.
    pub name: Option<String>,
    /// Manufacturer string.
    pub manufacturer: Option<String>,
    /// Model string.
    pub model: Option<String>,
    /// Whether the modem is powered.
    pub powered: bool,
    /// Whether the radio is online.
    pub online: bool,
    /// Interfaces the modem currently exposes.
    pub interfaces: Vec<String>,
    /// Whether `org.ofono.SimManager` is attached.
    pub has_sim_manager: bool,
    /// Whether `org.ofono.ConnectionManager` is attached.
    pub has_connection_manager: bool,
    /// Whether a SIM is inserted.
    pub sim_present: bool,
    /// Credential the SIM is waiting for, if any.
    pub pin_required: Option<PinType>,
    /// Remaining attempts per credential kind.
    pub retries: HashMap<PinType, u8>,
    /// IMSI, once the SIM is unlocked.
    pub subscriber_identity: Option<String>,
    /// Credential entry state.
    pub pin: PinStateMachine,
}

impl Modem {
    /// Creates a modem with no properties and no SIM attached.
    pub fn new(path: OwnedObjectPath) -> Self {
        Self {
            path,
            name: None,
            manufacturer: None,
            model: None,
            powered: false,
            online: false,
            interfaces: Vec::new(),
            has_sim_manager: false,
            has_connection_manager: false,
            sim_present: false,
            pin_required: None,
            retries: HashMap::new(),
            subscriber_identity: None,
            pin: PinStateMachine::default(),
        }
    }

    /// Remaining attempts for `kind`, if reported.
    pub fn retries_for(&self, kind: &PinType) -> Option<u8> {
        self.retries.get(kind).copied()
    }
}

/// A cellular bearer configuration (`org.ofono.ConnectionContext`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellularContext {
    /// D-Bus object path of the context.
    pub path: OwnedObjectPath,
    /// Context type (`internet`, `mms`, ...).
    pub context_type: Option<String>,
    /// Whether the bearer is up.
    pub active: bool,
    /// APN and credentials.
    pub settings: ContextSettings,
}

impl CellularContext {
    /// Returns `true` if APN, username and password are all empty.
    pub fn is_unconfigured(&self) -> bool {
        self.settings.access_point_name.is_empty()
            && self.settings.username.is_empty()
            && self.settings.password.is_empty()
    }
}

/// APN and credentials for a cellular context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Display name of the context.
    pub name: Option<String>,
    /// Access point name.
    pub access_point_name: String,
    /// Username, often empty.
    pub username: String,
    /// Password, often empty.
    pub password: String,
}

/// A consistent view of everything the engine tracks.
///
/// Published after every change; see
/// [`ConnectivityManager::subscribe`](crate::ConnectivityManager::subscribe).
#[derive(Debug, Clone, Default)]
pub struct ConnectivitySnapshot {
    /// Global ConnMan state.
    pub manager: ManagerState,
    /// Services in the Manager's order.
    pub services: Vec<Service>,
    /// Path of the last service that reached `ready` or `online`.
    pub last_active: Option<OwnedObjectPath>,
    /// Modems ordered by path.
    pub modems: Vec<Modem>,
    /// Number of modems with a SIM inserted.
    pub present_sims: usize,
    /// Modems waiting for a PIN-class credential.
    pub required_pins: HashMap<OwnedObjectPath, PinType>,
    /// Modems waiting for a PUK-class credential.
    pub locked_puks: HashMap<OwnedObjectPath, PinType>,
}

impl ConnectivitySnapshot {
    /// Looks up a service by path.
    pub fn service(&self, path: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.path.as_str() == path)
    }

    /// Looks up a modem by path.
    pub fn modem(&self, path: &str) -> Option<&Modem> {
        self.modems.iter().find(|m| m.path.as_str() == path)
    }
}

/// Timeout class of a bus call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallClass {
    /// Short default budget.
    #[default]
    Default,
    /// Extended budget for calls that block until a connection outcome.
    Connect,
}

/// Timeouts applied to bus calls.
///
/// # Examples
///
/// ```rust
/// use cmrs::TimeoutConfig;
/// use std::time::Duration;
///
/// let config = TimeoutConfig::new()
///     .with_connect_timeout(Duration::from_secs(180))
///     .with_call_timeout(Duration::from_secs(10));
/// assert_eq!(config.call_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Budget for `Connect`.
    pub connect_timeout: Duration,
    /// Budget for every other call.
    pub call_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: timeouts::connect_timeout(),
            call_timeout: timeouts::call_timeout(),
        }
    }
}

impl TimeoutConfig {
    /// Creates the default configuration (120 s connect, 25 s otherwise).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connect-class timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The budget for a call of the given class.
    pub fn for_class(&self, class: CallClass) -> Duration {
        match class {
            CallClass::Default => self.call_timeout,
            CallClass::Connect => self.connect_timeout,
        }
    }
}

/// Which message bus to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusKind {
    /// The system bus, where ConnMan and oFono normally live.
    #[default]
    System,
    /// The session bus, useful with mock daemons.
    Session,
}

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    /// Call timeouts.
    pub timeouts: TimeoutConfig,
    /// Bus to connect to.
    pub bus: BusKind,
    /// Whether to track oFono modems at all.
    pub track_modems: bool,
}

impl EngineConfig {
    /// Default configuration: system bus, default timeouts, modems tracked.
    pub fn new() -> Self {
        Self {
            track_modems: true,
            ..Self::default()
        }
    }

    /// Sets the call timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Selects the bus.
    #[must_use]
    pub fn with_bus(mut self, bus: BusKind) -> Self {
        self.bus = bus;
        self
    }

    /// Enables or disables modem tracking.
    #[must_use]
    pub fn with_modems(mut self, track: bool) -> Self {
        self.track_modems = track;
        self
    }
}

/// Errors that can occur while talking to ConnMan or oFono.
///
/// # Examples
///
/// ```no_run
/// use cmrs::{ConnectivityManager, ConnectivityError, PinErrorKind};
///
/// # async fn example() -> cmrs::Result<()> {
/// let cm = ConnectivityManager::new().await?;
/// let modem = "/hfp_0";
///
/// match cm.enter_pin(modem, "1234").await {
///     Ok(()) => println!("SIM unlocked"),
///     Err(ConnectivityError::InvalidPin(e)) => eprintln!("bad input: {e}"),
///     Err(e) if PinErrorKind::classify(&e) == PinErrorKind::WrongCredential => {
///         eprintln!("wrong PIN");
///     }
///     Err(e) => return Err(e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Error)]
pub enum ConnectivityError {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A value could not be encoded or decoded.
    #[error("variant error: {0}")]
    Variant(#[from] zvariant::Error),

    /// The remote method returned an error reply.
    #[error("method call failed: {name}{}", message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    MethodFailed {
        /// D-Bus error name.
        name: String,
        /// Human-readable message from the daemon.
        message: Option<String>,
    },

    /// The call did not complete within its budget.
    #[error("call timed out")]
    Timeout,

    /// No service is known at this path.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// No modem is known at this path.
    #[error("unknown modem: {0}")]
    UnknownModem(String),

    /// The modem exposes no SIM manager.
    #[error("modem {0} has no SIM manager")]
    NoSimManager(String),

    /// The modem exposes no connection manager.
    #[error("modem {0} has no connection manager")]
    NoConnectionManager(String),

    /// The SIM is not waiting for the requested credential.
    #[error("unexpected credential state: {0}")]
    UnexpectedPinState(String),

    /// The credential was rejected before being sent.
    #[error("invalid credential: {0}")]
    InvalidPin(#[from] PinValidationError),

    /// The argument list does not match any supported call shape.
    #[error("unsupported arguments for {0}")]
    UnsupportedArguments(String),

    /// Setting up a cellular context failed.
    #[error("cellular context setup failed: {0}")]
    ContextSetup(String),

    /// The engine task has stopped.
    #[error("engine stopped")]
    EngineStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_from_str() {
        assert_eq!(ServiceType::from("wifi"), ServiceType::Wifi);
        assert_eq!(ServiceType::from("vpn"), ServiceType::Vpn);
        assert_eq!(ServiceType::from("gadget"), ServiceType::Other("gadget".into()));
        assert_eq!(format!("{}", ServiceType::Cellular), "cellular");
    }

    #[test]
    fn service_state_connected() {
        assert!(ServiceState::from("online").is_connected());
        assert!(ServiceState::from("ready").is_connected());
        assert!(!ServiceState::from("failure").is_connected());
        assert!(ServiceState::from("association").is_connecting());
        assert_eq!(ServiceState::from("bogus"), ServiceState::Unknown);
    }

    #[test]
    fn primary_security_skips_wps() {
        let mut service = Service::provisional(OwnedObjectPath::try_from("/s").unwrap(), 0);
        service.security = vec![Security::Wps, Security::Psk];
        assert_eq!(service.primary_security(), Some(&Security::Psk));
    }

    #[test]
    fn technologies_from_names() {
        let techs = Technologies::from_names(["wifi", "cellular", "gps"]);
        assert_eq!(techs, Technologies::WIFI | Technologies::CELLULAR);
    }

    #[test]
    fn pin_validation_examples() {
        assert!(PinType::Pin.validate("1234").is_ok());
        assert!(matches!(
            PinType::Pin.validate("123"),
            Err(PinValidationError::Length { min: 4, .. })
        ));
        assert!(PinType::Puk.validate("12345678").is_ok());
        assert!(PinType::Puk.validate("1234567").is_err());
        assert_eq!(
            PinType::Pin.validate("12a4"),
            Err(PinValidationError::NonDecimal)
        );
    }

    #[test]
    fn pin_ranges_per_level() {
        assert!(PinType::Pin2.validate("123456789").is_err());
        assert!(PinType::Net.validate("1234567890123456").is_ok());
        assert!(PinType::Net.validate("12345678901234567").is_err());
        assert!(PinType::None.validate("").is_ok());
        assert!(PinType::None.validate("123456789").is_err());
        assert!(PinType::Other("x".into()).validate("1234").is_err());
    }

    #[test]
    fn puk_reset_targets() {
        assert_eq!(PinType::Puk.reset_target(), Some(PinType::Pin));
        assert_eq!(PinType::Puk2.reset_target(), Some(PinType::Pin2));
        assert_eq!(PinType::CorpPuk.reset_target(), Some(PinType::Corp));
        assert_eq!(PinType::Pin.reset_target(), None);
        assert_eq!(PinType::Pin.unblocking_puk(), Some(PinType::Puk));
    }

    #[test]
    fn pin_type_round_trips_names() {
        for name in ["pin", "puk2", "netsubpuk", "firstphone"] {
            assert_eq!(PinType::from(name).as_str(), name);
        }
    }

    #[test]
    fn pin_error_classification() {
        assert_eq!(
            PinErrorKind::from_error_name("org.ofono.Error.IncorrectPassword"),
            PinErrorKind::WrongCredential
        );
        assert_eq!(
            PinErrorKind::from_error_name("org.ofono.Error.InvalidFormat"),
            PinErrorKind::MalformedCredential
        );
        assert_eq!(
            PinErrorKind::classify(&ConnectivityError::Timeout),
            PinErrorKind::Other
        );
    }

    #[test]
    fn timeout_classes() {
        let config = TimeoutConfig::new();
        assert_eq!(config.for_class(CallClass::Connect), Duration::from_secs(120));
        assert_eq!(config.for_class(CallClass::Default), Duration::from_secs(25));
    }

    #[test]
    fn empty_context_is_unconfigured() {
        let ctx = CellularContext {
            path: OwnedObjectPath::try_from("/modem/context1").unwrap(),
            context_type: Some("internet".into()),
            active: false,
            settings: ContextSettings::default(),
        };
        assert!(ctx.is_unconfigured());
    }
}
