//! Unit tests for heartbeat snapshots and cursor restoration.

mod common;

use std::time::Duration;

use mongodb::bson::DateTime;
use wpokt_validator::health::{
    next_sync_time, restored_eth_block, restored_pokt_height, service_health,
};
use wpokt_validator::models::{HealthRecord, ServiceHealth};

fn record_with(healths: Vec<ServiceHealth>) -> HealthRecord {
    HealthRecord {
        id: None,
        pokt_vault_address: common::DUMMY_VAULT_ADDRESS.to_string(),
        eth_validator_address: "0x0000000000000000000000000000000000000001".to_string(),
        service_healths: healths,
        created_at: DateTime::now(),
        updated_at: DateTime::now(),
    }
}

/// Test that cursors round-trip through the heartbeat document.
#[test]
fn test_cursor_restoration() {
    let mut monitor = ServiceHealth::new("mint monitor");
    monitor.pokt_height = "12345".to_string();
    let mut executor = ServiceHealth::new("mint executor");
    executor.eth_block_number = "777".to_string();
    let record = record_with(vec![monitor, executor]);

    assert_eq!(restored_pokt_height(Some(&record), "mint monitor"), Some(12345));
    assert_eq!(restored_eth_block(Some(&record), "mint executor"), Some(777));
    assert!(service_health(Some(&record), "burn monitor").is_none());
}

/// Test that absent or unparsable cursors restore to nothing.
#[test]
fn test_cursor_restoration_fallbacks() {
    assert_eq!(restored_pokt_height(None, "mint monitor"), None);

    let mut monitor = ServiceHealth::new("mint monitor");
    monitor.pokt_height = "not-a-number".to_string();
    let record = record_with(vec![monitor]);
    assert_eq!(restored_pokt_height(Some(&record), "mint monitor"), None);
    // the eth cursor of a pokt-side service is empty by construction
    assert_eq!(restored_eth_block(Some(&record), "mint monitor"), None);
}

/// Test that the next sync time trails the last by the interval.
#[test]
fn test_next_sync_time() {
    let last = DateTime::from_millis(1_000_000);
    let next = next_sync_time(last, Duration::from_secs(300));
    assert_eq!(next.timestamp_millis() - last.timestamp_millis(), 300_000);
}
