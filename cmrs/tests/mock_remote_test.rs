//! Service commands against an in-memory remote object.

use cmrs::dbus::mock::MockRemote;
use cmrs::{CallClass, ConnectivityError, IpSettings, ServiceMutator};

#[tokio::test]
async fn test_connect_then_configure() {
    let remote = MockRemote::new("/net/connman/service/ethernet_0");
    let service = ServiceMutator::new(remote.clone());

    service.connect().await.unwrap();
    service
        .configure_ipv4(&IpSettings::manual("10.0.0.2", "255.0.0.0", Some("10.0.0.1")))
        .await
        .unwrap();
    service.set_autoconnect(false).await.unwrap();

    assert_eq!(remote.methods(), vec!["Connect", "SetProperty", "SetProperty"]);
    let calls = remote.calls();
    assert_eq!(calls[0].class, CallClass::Connect);
    assert_eq!(calls[1].args[0], "IPv4.Configuration");
    assert_eq!(calls[2].args, vec!["AutoConnect", "false"]);
}

#[tokio::test]
async fn test_daemon_error_keeps_its_name() {
    let remote = MockRemote::new("/net/connman/service/wifi_1");
    let service = ServiceMutator::new(remote.clone());
    remote.fail_next("Disconnect", "net.connman.Error.NotConnected");

    match service.disconnect().await {
        Err(ConnectivityError::MethodFailed { name, .. }) => {
            assert_eq!(name, "net.connman.Error.NotConnected")
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(service.path(), "/net/connman/service/wifi_1");
}

#[tokio::test]
async fn test_nameservers_and_clear() {
    let remote = MockRemote::new("/net/connman/service/wifi_2");
    let service = ServiceMutator::new(remote.clone());

    service
        .configure_nameservers(&["9.9.9.9".to_string(), "1.1.1.1".to_string()])
        .await
        .unwrap();
    service.clear_property("Nameservers.Configuration").await.unwrap();

    let last = remote.last_call().unwrap();
    assert_eq!(last.method, "ClearProperty");
    assert_eq!(last.args, vec!["Nameservers.Configuration"]);
}
