use cmrs::{ConnectivityManager, PinErrorKind, PinState};

#[tokio::main]
async fn main() -> cmrs::Result<()> {
    env_logger::init();

    let pin = std::env::var("SIM_PIN").unwrap_or_else(|_| "1234".to_string());
    let cm = ConnectivityManager::new().await?;

    let mut updates = cm.subscribe();
    updates.changed().await.ok();

    for modem in cm.modems() {
        let path = modem.path.as_str();
        println!("{path}: {:?}", modem.pin.state());

        match modem.pin.state() {
            PinState::PinRequired(kind) => {
                println!("  {} attempts left", modem.retries_for(kind).unwrap_or(0));
                match cm.enter_pin(path, &pin).await {
                    Ok(()) => println!("  unlocked"),
                    Err(e) => match PinErrorKind::classify(&e) {
                        PinErrorKind::WrongCredential => println!("  wrong PIN"),
                        _ => println!("  failed: {e}"),
                    },
                }
            }
            PinState::PukRequired(_) => {
                let puk = std::env::var("SIM_PUK").unwrap_or_default();
                cm.submit_puk(path, &puk).await?;
                cm.reset_pin(path, &pin).await?;
                println!("  PIN reset");
            }
            PinState::Locked(_) => println!("  SIM is permanently locked"),
            _ => {}
        }
    }

    Ok(())
}
