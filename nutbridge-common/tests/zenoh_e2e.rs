//! End-to-end tests with Zenoh pub/sub.
//!
//! These tests verify that payloads published through [`ZenohBus`] reach
//! a local subscriber.
//!
//! Note: Zenoh requires multi-thread tokio runtime.
//! Each test uses a unique key prefix to avoid interference.

use std::time::Duration;

use nutbridge_common::{BusTransport, Format, KeyExprBuilder, ZenohBus, decode, encode};
use serde::{Deserialize, Serialize};

/// Generate a unique test prefix to avoid test interference.
fn unique_prefix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test_{}", nanos)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Reading {
    value: String,
    previous: Option<String>,
}

/// Raw text payloads arrive untouched.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bus_publishes_raw_state() {
    let keys = KeyExprBuilder::new(unique_prefix());

    let session = zenoh::open(zenoh::Config::default())
        .await
        .expect("Failed to open Zenoh session");
    let subscriber = session
        .declare_subscriber(keys.wildcard())
        .await
        .expect("Failed to create subscriber");

    // Give subscriber time to set up
    tokio::time::sleep(Duration::from_millis(100)).await;

    let bus = ZenohBus::from_session(session.clone());
    bus.publish(&keys.state_key(), b"online".to_vec())
        .await
        .expect("Failed to publish");

    let received = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for message")
        .expect("Failed to receive message");

    assert_eq!(received.key_expr().as_str(), keys.state_key());
    assert_eq!(received.payload().to_bytes().as_ref(), b"online");

    drop(subscriber);
    bus.disconnect(Duration::from_millis(250)).await;
}

/// CBOR-encoded payloads survive a real publish/subscribe round trip.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bus_cbor_payload() {
    let keys = KeyExprBuilder::new(unique_prefix());

    let session = zenoh::open(zenoh::Config::default())
        .await
        .expect("Failed to open Zenoh session");
    let subscriber = session
        .declare_subscriber(keys.wildcard())
        .await
        .expect("Failed to create subscriber");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let reading = Reading {
        value: "100".to_string(),
        previous: None,
    };
    let bus = ZenohBus::from_session(session.clone());
    let key = keys.build("hosts/ups01/myups/battery/charge");
    bus.publish(&key, encode(&reading, Format::Cbor).unwrap())
        .await
        .expect("Failed to publish");

    let received = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout")
        .expect("Failed to receive");

    let decoded: Reading = decode(&received.payload().to_bytes(), Format::Cbor).unwrap();
    assert_eq!(decoded, reading);

    drop(subscriber);
    bus.disconnect(Duration::from_millis(250)).await;
}

/// Publishing on an invalid key expression is reported as a transport error.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bus_rejects_invalid_key() {
    let bus = ZenohBus::connect(&Default::default())
        .await
        .expect("Failed to open Zenoh session");

    let err = bus
        .publish("nut//state", b"online".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, nutbridge_common::Error::Transport { .. }));

    bus.disconnect(Duration::from_millis(250)).await;
}
