//! Last-known snapshot per device, with expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::device::{Device, DeviceKey};

/// A cached device snapshot and when it was last seen.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub device: Device,
    pub last_seen: Instant,
}

/// Snapshot cache keyed by `(host, device)`.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: HashMap<DeviceKey, CacheEntry>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert or replace the entry for `device`, stamped `now`.
    pub fn refresh(&mut self, device: Device, now: Instant) {
        self.entries.insert(
            device.key(),
            CacheEntry {
                device,
                last_seen: now,
            },
        );
    }

    /// Drop every entry last seen more than `expiry` before `now`.
    ///
    /// An entry exactly `expiry` old is kept. Returns the dropped keys.
    pub fn prune(&mut self, expiry: Duration, now: Instant) -> Vec<DeviceKey> {
        let stale: Vec<DeviceKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) > expiry)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            self.entries.remove(key);
        }
        stale
    }
}
