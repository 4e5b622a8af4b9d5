//! Tests for input validation.
//!
//! These tests verify that malformed credentials and settings are caught
//! before any D-Bus call is made.

use cmrs::{
    ConnectivityError, IpSettings, PinErrorKind, PinState, PinStateMachine, PinType,
    PinValidationError, PropertyOverlay, ProxySettings, Technologies,
};

#[test]
fn test_pin_length_bounds() {
    assert!(PinType::Pin.validate("1234").is_ok());
    assert!(PinType::Pin.validate("12345678").is_ok());
    assert!(matches!(
        PinType::Pin.validate("123"),
        Err(PinValidationError::Length { min: 4, max: 8, actual: 3, .. })
    ));
    assert!(PinType::Pin2.validate("123456789").is_err());
}

#[test]
fn test_puk_must_be_eight_digits() {
    assert!(PinType::Puk.validate("12345678").is_ok());
    assert!(PinType::Puk.validate("1234567").is_err());
    assert!(PinType::Puk2.validate("123456789").is_err());
}

#[test]
fn test_non_decimal_rejected() {
    assert_eq!(
        PinType::Pin.validate("12a4"),
        Err(PinValidationError::NonDecimal)
    );
    assert_eq!(
        PinType::Puk.validate("1234 678"),
        Err(PinValidationError::NonDecimal)
    );
}

#[test]
fn test_unknown_kind_cannot_be_validated() {
    let kind = PinType::from("simlock");
    assert_eq!(kind, PinType::Other("simlock".into()));
    assert!(matches!(
        kind.validate("1234"),
        Err(PinValidationError::UnknownKind(_))
    ));
}

#[test]
fn test_puk_pin_pairs() {
    assert_eq!(PinType::Puk.reset_target(), Some(PinType::Pin));
    assert_eq!(PinType::Pin2.unblocking_puk(), Some(PinType::Puk2));
    assert_eq!(PinType::CorpPuk.reset_target(), Some(PinType::Corp));
    assert!(PinType::Pin.reset_target().is_none());
    assert!(PinType::Puk.is_puk() && !PinType::Puk.is_pin());
}

#[test]
fn test_error_classification() {
    let wrong = ConnectivityError::MethodFailed {
        name: "org.ofono.Error.IncorrectPassword".into(),
        message: None,
    };
    let malformed = ConnectivityError::MethodFailed {
        name: "org.ofono.Error.InvalidFormat".into(),
        message: None,
    };
    assert_eq!(PinErrorKind::classify(&wrong), PinErrorKind::WrongCredential);
    assert_eq!(
        PinErrorKind::classify(&malformed),
        PinErrorKind::MalformedCredential
    );
    assert_eq!(
        PinErrorKind::classify(&ConnectivityError::Timeout),
        PinErrorKind::Other
    );
}

#[test]
fn test_fresh_state_machine() {
    let machine = PinStateMachine::default();
    assert_eq!(machine.state(), &PinState::None);
    assert!(machine.last_error().is_none());
    assert!(!machine.has_pending_puk());
}

#[test]
fn test_ip_settings_constructors() {
    assert_eq!(IpSettings::dhcp().method.as_deref(), Some("dhcp"));
    assert!(IpSettings::default().is_empty());

    let v4 = IpSettings::manual("192.168.1.10", "255.255.255.0", Some("192.168.1.1"));
    assert_eq!(v4.netmask.as_deref(), Some("255.255.255.0"));
    assert!(v4.prefix_length.is_none());

    let v6 = IpSettings::manual_v6("2001:db8::10", 64, None);
    assert_eq!(v6.prefix_length, Some(64));
    assert!(v6.gateway.is_none());
}

#[test]
fn test_proxy_settings_constructors() {
    assert!(ProxySettings::default().is_empty());
    let auto = ProxySettings::auto(Some("http://wpad/wpad.dat"));
    assert_eq!(auto.method.as_deref(), Some("auto"));
    let manual = ProxySettings::manual(vec!["proxy:3128".into()], vec!["localhost".into()]);
    assert_eq!(manual.servers.len(), 1);
    assert!(!manual.is_empty());
}

#[test]
fn test_overlay_prefers_configured() {
    let mut overlay = PropertyOverlay::new(Some("dhcp"), None);
    assert_eq!(overlay.resolved(), Some(&"dhcp"));
    overlay.set_configured(Some("manual"));
    assert_eq!(overlay.resolved(), Some(&"manual"));
    assert!(overlay.is_configured());
    overlay.clear_configured();
    assert_eq!(overlay.resolved(), Some(&"dhcp"));
}

#[test]
fn test_technology_names() {
    let set = Technologies::from_names(["wifi", "ethernet", "gadget"]);
    assert_eq!(set, Technologies::WIFI | Technologies::ETHERNET);
    assert!(Technologies::from_technology("gadget").is_none());
    // Wire names are lowercase; the flag names stay available separately.
    assert_eq!(
        Technologies::from_technology("wifi"),
        Some(Technologies::WIFI)
    );
    assert_eq!(Technologies::from_name("WIFI"), Some(Technologies::WIFI));
}
