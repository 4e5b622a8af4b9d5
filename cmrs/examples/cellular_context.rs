use cmrs::{ConnectivityManager, ContextSettings};

#[tokio::main]
async fn main() -> cmrs::Result<()> {
    env_logger::init();

    let apn = std::env::args().nth(1).unwrap_or_else(|| "internet".to_string());
    let cm = ConnectivityManager::new().await?;

    let mut updates = cm.subscribe();
    updates.changed().await.ok();

    let Some(modem) = cm.modems().into_iter().find(|m| m.has_connection_manager) else {
        println!("No modem with a data connection manager");
        return Ok(());
    };

    let settings = ContextSettings {
        access_point_name: apn,
        ..Default::default()
    };
    let context = cm.setup_cellular_context(modem.path.as_str(), settings).await?;
    println!("Internet context ready at {context}");

    for ctx in cm.cellular_contexts(modem.path.as_str()).await? {
        println!(
            "{:30} {:10} apn={} active={}",
            ctx.path.as_str(),
            ctx.context_type.as_deref().unwrap_or("?"),
            ctx.settings.access_point_name,
            ctx.active
        );
    }

    Ok(())
}
