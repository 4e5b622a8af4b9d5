use cmrs::ConnectivityManager;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> cmrs::Result<()> {
    env_logger::init();

    let cm = ConnectivityManager::new().await?;
    // Keep the sender alive; the list prints on every change until killed
    let (_stop, shutdown) = watch::channel(());

    cm.monitor_changes(shutdown, |snapshot| {
        println!(
            "-- {} (offline mode: {})",
            snapshot.manager.state.as_deref().unwrap_or("unknown"),
            snapshot.manager.offline_mode
        );
        for service in &snapshot.services {
            println!(
                "{:2} {:30} {:12} {:4}% {}",
                service.index,
                service.name.as_deref().unwrap_or("<hidden>"),
                service.state.to_string(),
                service.strength.unwrap_or(0),
                service
                    .service_type
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            );
        }
    })
    .await
}
