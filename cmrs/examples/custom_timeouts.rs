/// Example demonstrating custom timeout configuration.
///
/// Cellular and enterprise Wi-Fi connects can take far longer than the
/// default budget; this raises the connect timeout and shortens the one
/// used for every other call.
use cmrs::{ConnectivityManager, EngineConfig, TimeoutConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> cmrs::Result<()> {
    env_logger::init();

    let timeouts = TimeoutConfig::new()
        .with_connect_timeout(Duration::from_secs(180)) // Wait up to 3 minutes for Connect
        .with_call_timeout(Duration::from_secs(10)); // Everything else

    let cm = ConnectivityManager::with_config(EngineConfig::new().with_timeouts(timeouts)).await?;

    println!("Engine configured with custom timeouts:");
    println!("  Connect timeout: {:?}", cm.timeout_config().connect_timeout);
    println!("  Call timeout:    {:?}", cm.timeout_config().call_timeout);

    let mut updates = cm.subscribe();
    updates.changed().await.ok();

    // Connect the first favorite service (uses the 180s budget)
    if let Some(service) = cm.services().into_iter().find(|s| s.favorite) {
        println!("\nConnecting {}...", service.name.as_deref().unwrap_or("?"));
        cm.connect_service(service.path.as_str()).await?;
        println!("Connected successfully!");
    }

    let defaults = TimeoutConfig::default();
    println!("\nDefault timeouts:");
    println!("  Connect timeout: {:?}", defaults.connect_timeout);
    println!("  Call timeout:    {:?}", defaults.call_timeout);

    Ok(())
}
