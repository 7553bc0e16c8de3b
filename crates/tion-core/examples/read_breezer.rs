//! Example: Reading Breezer State
//!
//! Connects to a breezer and prints its current state as JSON. Passing
//! `dummy` as the address replays a captured Lite answer instead.
//!
//! Run with: `cargo run --example read_breezer -- <ADDRESS> [lite|s3]`

use std::env;

use tion_core::ble::BleTransport;
use tion_core::mock::FixtureTransport;
use tion_core::{Breezer, DeviceModel, Transport};

async fn read<T: Transport>(
    mut breezer: Breezer<T>,
    device_info: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Reading {} at {}...", breezer.model(), breezer.address());
    breezer.get(false).await?;
    println!("{}", serde_json::to_string_pretty(&breezer.state_json())?);

    if device_info && breezer.model() == DeviceModel::Lite {
        let firmware = breezer.get_device_info().await?;
        println!("Firmware: {}", firmware);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(address) = args.get(1) else {
        eprintln!("Usage: {} <ADDRESS> [lite|s3]", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} AA:BB:CC:DD:EE:FF s3", args[0]);
        eprintln!("  {} dummy", args[0]);
        std::process::exit(1);
    };
    let model: DeviceModel = match args.get(2) {
        Some(m) => m.parse()?,
        None => DeviceModel::Lite,
    };

    if address == "dummy" {
        let breezer = Breezer::for_model(FixtureTransport::lite_dummy(), "dummy", DeviceModel::Lite);
        return read(breezer, false).await;
    }

    read(Breezer::for_model(BleTransport::new(), address.as_str(), model), true).await
}
