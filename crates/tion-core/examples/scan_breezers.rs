//! Example: Scanning for Tion Breezers
//!
//! Lists every Tion Lite or S3 breezer advertising in range.
//!
//! Run with: `cargo run --example scan_breezers`

use std::time::Duration;

use tion_core::ble::{get_adapter, scan_for_breezers};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Scanning for Tion breezers...");
    println!();

    let adapter = get_adapter().await?;
    let breezers = scan_for_breezers(&adapter, Duration::from_secs(10)).await?;

    if breezers.is_empty() {
        println!("No breezers found.");
        println!();
        println!("Make sure:");
        println!("  - The breezer is powered");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - The breezer is not connected to another host");
        return Ok(());
    }

    println!("Found {} breezer(s):", breezers.len());
    println!();
    for breezer in &breezers {
        let model = breezer
            .model
            .map(|m| m.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let rssi = breezer
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());

        println!("  {} [{}]", breezer.name.as_deref().unwrap_or("Unknown"), model);
        println!("    Identifier: {}", breezer.identifier);
        println!("    RSSI: {}", rssi);
        println!();
    }

    Ok(())
}
