//! Constants for the ConnMan and oFono D-Bus interfaces.
//!
//! Bus names, interface names, property keys and the timeout defaults
//! used when talking to either daemon.

/// ConnMan (`net.connman`) names.
pub mod connman {
    pub const SERVICE: &str = "net.connman";
    pub const MANAGER_PATH: &str = "/";
    pub const MANAGER_INTERFACE: &str = "net.connman.Manager";
    pub const SERVICE_INTERFACE: &str = "net.connman.Service";
}

/// oFono (`org.ofono`) names.
pub mod ofono {
    pub const SERVICE: &str = "org.ofono";
    pub const MANAGER_PATH: &str = "/";
    pub const MANAGER_INTERFACE: &str = "org.ofono.Manager";
    pub const MODEM_INTERFACE: &str = "org.ofono.Modem";
    pub const SIM_MANAGER_INTERFACE: &str = "org.ofono.SimManager";
    pub const CONNECTION_MANAGER_INTERFACE: &str = "org.ofono.ConnectionManager";
    pub const CONNECTION_CONTEXT_INTERFACE: &str = "org.ofono.ConnectionContext";

    /// Context type requested when creating a new internet bearer.
    pub const INTERNET_CONTEXT: &str = "internet";
}

/// Signal and method member names shared by both daemons.
pub mod members {
    pub const PROPERTY_CHANGED: &str = "PropertyChanged";
    pub const GET_PROPERTIES: &str = "GetProperties";
    pub const SET_PROPERTY: &str = "SetProperty";
    pub const CLEAR_PROPERTY: &str = "ClearProperty";

    pub const CONNECT: &str = "Connect";
    pub const DISCONNECT: &str = "Disconnect";
    pub const REMOVE: &str = "Remove";
    pub const REMOVE_PROVIDER: &str = "RemoveProvider";

    pub const GET_MODEMS: &str = "GetModems";
    pub const MODEM_ADDED: &str = "ModemAdded";
    pub const MODEM_REMOVED: &str = "ModemRemoved";

    pub const ENTER_PIN: &str = "EnterPin";
    pub const RESET_PIN: &str = "ResetPin";
    pub const CHANGE_PIN: &str = "ChangePin";

    pub const GET_CONTEXTS: &str = "GetContexts";
    pub const ADD_CONTEXT: &str = "AddContext";
    pub const REMOVE_CONTEXT: &str = "RemoveContext";
}

/// ConnMan Manager and Service property keys.
pub mod service_keys {
    pub const SERVICES: &str = "Services";
    pub const OFFLINE_MODE: &str = "OfflineMode";
    pub const STATE: &str = "State";
    pub const AVAILABLE_TECHNOLOGIES: &str = "AvailableTechnologies";
    pub const ENABLED_TECHNOLOGIES: &str = "EnabledTechnologies";
    pub const CONNECTED_TECHNOLOGIES: &str = "ConnectedTechnologies";

    pub const NAME: &str = "Name";
    pub const TYPE: &str = "Type";
    pub const FAVORITE: &str = "Favorite";
    pub const STRENGTH: &str = "Strength";
    pub const SECURITY: &str = "Security";
    pub const PASSPHRASE: &str = "Passphrase";
    pub const PASSPHRASE_REQUIRED: &str = "PassphraseRequired";
    pub const SETUP_REQUIRED: &str = "SetupRequired";
    pub const IPV4: &str = "IPv4";
    pub const IPV4_CONFIGURATION: &str = "IPv4.Configuration";
    pub const IPV6: &str = "IPv6";
    pub const IPV6_CONFIGURATION: &str = "IPv6.Configuration";
    pub const NAMESERVERS: &str = "Nameservers";
    pub const NAMESERVERS_CONFIGURATION: &str = "Nameservers.Configuration";
    pub const PROXY: &str = "Proxy";
    pub const PROXY_CONFIGURATION: &str = "Proxy.Configuration";
    pub const IMMUTABLE: &str = "Immutable";
    pub const LOGIN_REQUIRED: &str = "LoginRequired";
    pub const AUTO_CONNECT: &str = "AutoConnect";
    pub const ETHERNET: &str = "Ethernet";
    pub const ERROR: &str = "Error";

    pub const METHOD: &str = "Method";
    pub const ADDRESS: &str = "Address";
    pub const NETMASK: &str = "Netmask";
    pub const PREFIX_LENGTH: &str = "PrefixLength";
    pub const GATEWAY: &str = "Gateway";
    pub const URL: &str = "URL";
    pub const SERVERS: &str = "Servers";
    pub const EXCLUDES: &str = "Excludes";
}

/// oFono Modem, SimManager and ConnectionContext property keys.
pub mod modem_keys {
    pub const INTERFACES: &str = "Interfaces";
    pub const MANUFACTURER: &str = "Manufacturer";
    pub const MODEL: &str = "Model";
    pub const NAME: &str = "Name";
    pub const POWERED: &str = "Powered";
    pub const ONLINE: &str = "Online";

    pub const PRESENT: &str = "Present";
    pub const PIN_REQUIRED: &str = "PinRequired";
    pub const RETRIES: &str = "Retries";
    pub const SUBSCRIBER_IDENTITY: &str = "SubscriberIdentity";

    pub const TYPE: &str = "Type";
    pub const ACTIVE: &str = "Active";
    pub const ACCESS_POINT_NAME: &str = "AccessPointName";
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";
}

/// oFono error names used for PIN/PUK classification.
pub mod ofono_errors {
    pub const INCORRECT_PASSWORD: &str = "org.ofono.Error.IncorrectPassword";
    pub const FAILED: &str = "org.ofono.Error.Failed";
    pub const INVALID_FORMAT: &str = "org.ofono.Error.InvalidFormat";
    pub const INVALID_ARGUMENTS: &str = "org.ofono.Error.InvalidArguments";
}

/// Timeout constants for bus calls.
///
/// ConnMan keeps a `Connect` call open until the outcome is known, so
/// connect-class calls get a much longer budget than everything else.
pub mod timeouts {
    use std::time::Duration;

    /// Budget for `Connect` (2 minutes).
    const CONNECT_TIMEOUT_SECS: u64 = 120;

    /// Budget for every other call (25 seconds, the D-Bus default).
    const CALL_TIMEOUT_SECS: u64 = 25;

    /// Returns the connect-class timeout.
    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    /// Returns the default call timeout.
    pub fn call_timeout() -> Duration {
        Duration::from_secs(CALL_TIMEOUT_SECS)
    }
}
