//! Hardware integration tests for tion-core
//!
//! These tests require a real breezer in range and should be run with:
//! ```text
//! cargo test --package tion-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the device via environment variables:
//! - `TION_DEVICE`: address of the breezer (or peripheral id on macOS)
//! - `TION_MODEL`: `lite` or `s3` (defaults to `s3`)
//!
//! Example:
//! ```text
//! TION_DEVICE="AA:BB:CC:DD:EE:FF" TION_MODEL=lite cargo test --package tion-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use tion_core::ble::{BleTransport, get_adapter, scan_for_breezers};
use tion_core::{Breezer, DeviceModel, Error};

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Get the breezer address from the environment
fn get_device() -> Option<String> {
    env::var("TION_DEVICE").ok().filter(|s| !s.is_empty())
}

fn get_model() -> DeviceModel {
    env::var("TION_MODEL")
        .ok()
        .and_then(|m| m.parse().ok())
        .unwrap_or(DeviceModel::S3)
}

fn session() -> Option<Breezer<BleTransport>> {
    let Some(address) = get_device() else {
        eprintln!("Skipping: TION_DEVICE not set");
        return None;
    };
    Some(Breezer::for_model(BleTransport::new(), address, get_model()))
}

// =============================================================================
// Scan Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_breezers() {
    let adapter = match get_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => panic!("No adapter: {}", e),
    };

    let result = timeout(
        Duration::from_secs(30),
        scan_for_breezers(&adapter, Duration::from_secs(10)),
    )
    .await;

    match result {
        Ok(Ok(breezers)) => {
            println!("Scan discovered {} breezers:", breezers.len());
            for b in &breezers {
                println!(
                    "  - {} ({}) model={:?} rssi={:?}",
                    b.name.as_deref().unwrap_or("Unknown"),
                    b.identifier,
                    b.model,
                    b.rssi
                );
            }
        }
        Ok(Err(e)) => panic!("Scan failed: {}", e),
        Err(_) => panic!("Scan timed out after 30 seconds"),
    }
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_get_state() {
    let Some(mut breezer) = session() else {
        return;
    };

    match timeout(BLE_TIMEOUT, breezer.get(false)).await {
        Ok(Ok(state)) => {
            println!("State: {}", serde_json::to_string_pretty(&state.to_json()).unwrap_or_default());
            assert!(state.has_valid_state);
            assert!(state.fan_speed <= state.max_fan_speed);
        }
        Ok(Err(e)) => panic!("Read failed: {}", e),
        Err(_) => panic!("Read timed out"),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_set_round_trip() {
    let Some(mut breezer) = session() else {
        return;
    };

    let original = match timeout(BLE_TIMEOUT, breezer.get(false)).await {
        Ok(Ok(state)) => state.clone(),
        Ok(Err(e)) => panic!("Read failed: {}", e),
        Err(_) => panic!("Read timed out"),
    };

    let flipped = if original.sound { "off" } else { "on" };
    let update = json!({"sound": flipped});
    let Some(update) = update.as_object() else {
        panic!("update is not an object");
    };
    match timeout(BLE_TIMEOUT, breezer.set(update, false)).await {
        Ok(Ok(packets)) => println!("Wrote {} packets", packets.len()),
        Ok(Err(e)) => panic!("Write failed: {}", e),
        Err(_) => panic!("Write timed out"),
    }

    match timeout(BLE_TIMEOUT, breezer.get(false)).await {
        Ok(Ok(state)) => assert_eq!(state.sound, !original.sound),
        Ok(Err(e)) => panic!("Read back failed: {}", e),
        Err(_) => panic!("Read back timed out"),
    }

    // Put the breezer back how it was
    let restore = json!({"sound": original.sound_flag()});
    if let Some(restore) = restore.as_object()
        && let Ok(Err(e)) = timeout(BLE_TIMEOUT, breezer.set(restore, false)).await
    {
        eprintln!("Could not restore sound setting: {}", e);
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_device_info() {
    let Some(mut breezer) = session() else {
        return;
    };

    match timeout(BLE_TIMEOUT, breezer.get_device_info()).await {
        Ok(Ok(firmware)) => {
            println!("Firmware: {}", firmware);
            assert_eq!(firmware.len(), 4);
        }
        Ok(Err(Error::Unsupported { model, .. })) => {
            println!("{} does not report device info", model);
            assert_eq!(model, DeviceModel::S3);
        }
        Ok(Err(e)) => panic!("Device info failed: {}", e),
        Err(_) => panic!("Device info timed out"),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_unknown_address_not_found() {
    let mut breezer = Breezer::for_model(BleTransport::new(), "00:11:22:33:44:55", get_model());

    match timeout(BLE_TIMEOUT, breezer.get(false)).await {
        Ok(Ok(_)) => panic!("Read from a breezer that should not exist"),
        Ok(Err(e)) => {
            println!("Failed as expected: {}", e);
            assert!(e.is_transport());
        }
        Err(_) => panic!("Lookup timed out"),
    }
}
