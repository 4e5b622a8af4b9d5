//! Helpers for decoding and encoding ConnMan/oFono property values.
//!
//! Both daemons report properties as `a{sv}` dictionaries whose values are
//! variants, sometimes nested one level deeper than expected. The decoders
//! here peel those layers and return `None` for anything of the wrong shape
//! instead of failing the whole fetch.

use std::collections::HashMap;
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::Result;
use crate::api::models::{IpSettings, PinType, ProxySettings};
use crate::types::constants::service_keys;

/// Strips any number of `Value::Value` wrappers.
pub(crate) fn peel<'a>(value: &'a Value<'a>) -> &'a Value<'a> {
    match value {
        Value::Value(inner) => peel(inner),
        other => other,
    }
}

pub(crate) fn as_string(value: &Value<'_>) -> Option<String> {
    match peel(value) {
        Value::Str(s) => Some(s.as_str().to_string()),
        Value::ObjectPath(p) => Some(p.as_str().to_string()),
        _ => None,
    }
}

/// Like [`as_string`] but treats the empty string as absent.
pub(crate) fn as_nonempty_string(value: &Value<'_>) -> Option<String> {
    as_string(value).filter(|s| !s.is_empty())
}

pub(crate) fn as_bool(value: &Value<'_>) -> Option<bool> {
    match peel(value) {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

pub(crate) fn as_u8(value: &Value<'_>) -> Option<u8> {
    match peel(value) {
        Value::U8(n) => Some(*n),
        Value::U16(n) => u8::try_from(*n).ok(),
        Value::U32(n) => u8::try_from(*n).ok(),
        _ => None,
    }
}

pub(crate) fn as_string_list(value: &Value<'_>) -> Option<Vec<String>> {
    match peel(value) {
        Value::Array(arr) => Some(arr.iter().filter_map(as_string).collect()),
        _ => None,
    }
}

/// Decodes an `ao`, skipping entries that are not valid paths.
pub(crate) fn as_path_list(value: &Value<'_>) -> Option<Vec<OwnedObjectPath>> {
    match peel(value) {
        Value::Array(arr) => Some(
            arr.iter()
                .filter_map(|v| match peel(v) {
                    Value::ObjectPath(p) => OwnedObjectPath::try_from(p.as_str().to_owned()).ok(),
                    Value::Str(s) => OwnedObjectPath::try_from(s.as_str().to_owned()).ok(),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Decodes an `a{sv}` (or `a{sy}`) into owned entries keyed by string.
pub(crate) fn as_dict(value: &Value<'_>) -> Option<HashMap<String, OwnedValue>> {
    match peel(value) {
        Value::Dict(dict) => Some(
            dict.iter()
                .filter_map(|(k, v)| {
                    let key = as_string(k)?;
                    let value = crate::try_log!(v.try_to_owned(), "Failed to own dictionary value");
                    Some((key, value))
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Decodes an `IPv4`/`IPv6` dictionary.
pub(crate) fn ip_settings(value: &Value<'_>) -> Option<IpSettings> {
    let dict = as_dict(value)?;
    let text = |key: &str| dict.get(key).and_then(|v| as_nonempty_string(v));

    let settings = IpSettings {
        method: text(service_keys::METHOD),
        address: text(service_keys::ADDRESS),
        netmask: text(service_keys::NETMASK),
        prefix_length: dict.get(service_keys::PREFIX_LENGTH).and_then(|v| as_u8(v)),
        gateway: text(service_keys::GATEWAY),
    };

    (!settings.is_empty()).then_some(settings)
}

/// Decodes a `Proxy` dictionary.
pub(crate) fn proxy_settings(value: &Value<'_>) -> Option<ProxySettings> {
    let dict = as_dict(value)?;
    let list = |key: &str| {
        dict.get(key)
            .and_then(|v| as_string_list(v))
            .unwrap_or_default()
    };

    let settings = ProxySettings {
        method: dict
            .get(service_keys::METHOD)
            .and_then(|v| as_nonempty_string(v)),
        url: dict.get(service_keys::URL).and_then(|v| as_nonempty_string(v)),
        servers: list(service_keys::SERVERS),
        excludes: list(service_keys::EXCLUDES),
    };

    (!settings.is_empty()).then_some(settings)
}

/// Decodes the SimManager `Retries` dictionary (`a{sy}`).
pub(crate) fn retries(value: &Value<'_>) -> HashMap<PinType, u8> {
    as_dict(value)
        .map(|dict| {
            dict.into_iter()
                .filter_map(|(k, v)| Some((PinType::from(k.as_str()), as_u8(&v)?)))
                .collect()
        })
        .unwrap_or_default()
}

/// Decodes the `PinRequired` string; `"none"` means nothing is required.
pub(crate) fn pin_required(value: &Value<'_>) -> Option<PinType> {
    as_string(value)
        .map(|s| PinType::from(s.as_str()))
        .filter(|kind| *kind != PinType::None)
}

/// Encodes an `IPv4.Configuration`/`IPv6.Configuration` dictionary.
pub(crate) fn encode_ip_settings(settings: &IpSettings) -> Result<OwnedValue> {
    let mut dict: HashMap<&str, Value<'_>> = HashMap::new();

    if let Some(method) = &settings.method {
        dict.insert(service_keys::METHOD, Value::from(method.as_str()));
    }
    if let Some(address) = &settings.address {
        dict.insert(service_keys::ADDRESS, Value::from(address.as_str()));
    }
    if let Some(netmask) = &settings.netmask {
        dict.insert(service_keys::NETMASK, Value::from(netmask.as_str()));
    }
    if let Some(prefix) = settings.prefix_length {
        dict.insert(service_keys::PREFIX_LENGTH, Value::from(prefix));
    }
    if let Some(gateway) = &settings.gateway {
        dict.insert(service_keys::GATEWAY, Value::from(gateway.as_str()));
    }

    Ok(Value::from(dict).try_to_owned()?)
}

/// Encodes a `Proxy.Configuration` dictionary.
pub(crate) fn encode_proxy_settings(settings: &ProxySettings) -> Result<OwnedValue> {
    let mut dict: HashMap<&str, Value<'_>> = HashMap::new();

    if let Some(method) = &settings.method {
        dict.insert(service_keys::METHOD, Value::from(method.as_str()));
    }
    if let Some(url) = &settings.url {
        dict.insert(service_keys::URL, Value::from(url.as_str()));
    }
    if !settings.servers.is_empty() {
        dict.insert(service_keys::SERVERS, Value::from(settings.servers.clone()));
    }
    if !settings.excludes.is_empty() {
        dict.insert(service_keys::EXCLUDES, Value::from(settings.excludes.clone()));
    }

    Ok(Value::from(dict).try_to_owned()?)
}

/// Encodes a string list such as `Nameservers.Configuration`.
pub(crate) fn encode_string_list(items: &[String]) -> Result<OwnedValue> {
    Ok(Value::from(items.to_vec()).try_to_owned()?)
}

pub(crate) fn encode_string(value: &str) -> Result<OwnedValue> {
    Ok(Value::from(value).try_to_owned()?)
}

pub(crate) fn encode_bool(value: bool) -> Result<OwnedValue> {
    Ok(Value::from(value).try_to_owned()?)
}

/// Macro to convert Result to Option with error logging.
/// Usage: `try_log!(result, "context message")`
#[macro_export]
macro_rules! try_log {
    ($result:expr, $context:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{}: {:?}", $context, e);
                return None;
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(v: Value<'_>) -> OwnedValue {
        v.try_to_owned().unwrap()
    }

    #[test]
    fn test_peel_nested_variants() {
        let inner = Value::from("ready");
        let wrapped = Value::Value(Box::new(Value::Value(Box::new(inner))));
        assert_eq!(as_string(&wrapped).as_deref(), Some("ready"));
    }

    #[test]
    fn test_scalars() {
        assert_eq!(as_bool(&Value::from(true)), Some(true));
        assert_eq!(as_u8(&Value::from(42u8)), Some(42));
        assert_eq!(as_u8(&Value::from(300u32)), None);
        assert_eq!(as_string(&Value::from(7u8)), None);
        assert_eq!(as_nonempty_string(&Value::from("")), None);
    }

    #[test]
    fn test_string_list() {
        let v = Value::from(vec!["psk".to_string(), "wps".to_string()]);
        assert_eq!(
            as_string_list(&v),
            Some(vec!["psk".to_string(), "wps".to_string()])
        );
    }

    #[test]
    fn test_path_list() {
        let paths = vec![
            OwnedObjectPath::try_from("/net/connman/service/a").unwrap(),
            OwnedObjectPath::try_from("/net/connman/service/b").unwrap(),
        ];
        let v = owned(Value::from(paths.clone()));
        assert_eq!(as_path_list(&v), Some(paths));
    }

    #[test]
    fn test_ip_settings_round_trip_through_dict() {
        let settings = IpSettings::manual("10.0.0.2", "255.255.255.0", Some("10.0.0.1"));
        let encoded = encode_ip_settings(&settings).unwrap();
        assert_eq!(ip_settings(&encoded), Some(settings));
    }

    #[test]
    fn test_empty_ip_dict_is_none() {
        let dict: HashMap<&str, Value<'_>> = HashMap::new();
        let v = owned(Value::from(dict));
        assert_eq!(ip_settings(&v), None);
    }

    #[test]
    fn test_proxy_settings() {
        let settings = ProxySettings::manual(
            vec!["proxy.example.com:3128".into()],
            vec!["localhost".into()],
        );
        let encoded = encode_proxy_settings(&settings).unwrap();
        assert_eq!(proxy_settings(&encoded), Some(settings));
    }

    #[test]
    fn test_retries_and_pin_required() {
        let mut dict: HashMap<&str, u8> = HashMap::new();
        dict.insert("pin", 3);
        dict.insert("puk", 10);
        let v = owned(Value::from(dict));
        let parsed = retries(&v);
        assert_eq!(parsed.get(&PinType::Pin), Some(&3));
        assert_eq!(parsed.get(&PinType::Puk), Some(&10));

        assert_eq!(pin_required(&Value::from("none")), None);
        assert_eq!(pin_required(&Value::from("puk")), Some(PinType::Puk));
    }
}
