//! Example: Changing Breezer Settings
//!
//! Turns the breezer on if needed, steps the fan through two speeds and
//! then puts back what it found.
//!
//! Run with: `cargo run --example set_breezer -- <ADDRESS> [lite|s3]`

use std::env;
use std::time::Duration;

use serde_json::json;
use tion_core::ble::BleTransport;
use tion_core::{Breezer, DeviceModel};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(address) = args.get(1) else {
        eprintln!("Usage: {} <ADDRESS> [lite|s3]", args[0]);
        std::process::exit(1);
    };
    let model: DeviceModel = match args.get(2) {
        Some(m) => m.parse()?,
        None => DeviceModel::Lite,
    };

    let mut breezer = Breezer::for_model(BleTransport::new(), address.as_str(), model);

    let initial = breezer.get(false).await?.clone();
    println!(
        "Breezer is {}, fan speed {}",
        initial.state(),
        initial.fan_speed
    );

    for speed in [1, 4] {
        let update = json!({"state": "on", "fan_speed": speed});
        if let Some(update) = update.as_object() {
            println!("Setting fan speed to {}", speed);
            breezer.set(update, false).await?;
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    println!("Restoring initial state");
    let restore = json!({"state": initial.state(), "fan_speed": initial.fan_speed});
    if let Some(restore) = restore.as_object() {
        breezer.set(restore, true).await?;
    }
    println!("Done");
    Ok(())
}
