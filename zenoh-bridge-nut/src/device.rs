//! UPS devices and the registry of polled upsd servers.

use std::fmt;

use tracing::debug;

use crate::config::HostAddr;
use crate::diff::{diff, removed};
use crate::upsd::{self, Command, TcpUpsdClient, UpsdClient, UpsdError, VarMap};

/// Identity of a device across all polled hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    pub host: String,
    pub id: String,
}

impl DeviceKey {
    pub fn new(host: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.id)
    }
}

/// A UPS attached to an upsd server, with its last fetched variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub host: String,
    pub description: String,
    pub variables: VarMap,
}

impl Device {
    pub fn new(
        host: impl Into<String>,
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            description: description.into(),
            variables: VarMap::new(),
        }
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(&self.host, &self.id)
    }
}

/// List the UPSes an upsd server knows about.
///
/// Returned devices carry no variables yet.
pub async fn list_devices<C: UpsdClient>(client: &C) -> Result<Vec<Device>, UpsdError> {
    let upses = upsd::execute(client, &Command::ListUps).await?;
    Ok(upses
        .into_iter()
        .map(|(id, description)| Device::new(client.host(), id, description))
        .collect())
}

/// Refresh `device.variables` from the server and return what changed.
///
/// Added and changed variables carry their new value. Variables missing from
/// the fresh listing are removed from the device and reported with an empty
/// value.
pub async fn fetch_and_merge<C: UpsdClient>(
    client: &C,
    device: &mut Device,
) -> Result<VarMap, UpsdError> {
    let fresh = upsd::execute(client, &Command::ListVar(device.id.clone())).await?;

    let mut changes = diff(&device.variables, &fresh);
    let gone = removed(&device.variables, &fresh);

    for (name, value) in &changes {
        device.variables.insert(name.clone(), value.clone());
    }
    for name in gone {
        device.variables.remove(&name);
        changes.insert(name, String::new());
    }

    debug!(
        device = %device.key(),
        changed = changes.len(),
        total = device.variables.len(),
        "Merged variables"
    );

    Ok(changes)
}

/// One polled upsd server and the devices last seen on it.
#[derive(Debug)]
pub struct HostEntry<C> {
    pub client: C,
    pub devices: Vec<Device>,
}

impl<C: UpsdClient> HostEntry<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            devices: Vec::new(),
        }
    }

    /// Replace the device set with `listed`, keeping variables of survivors.
    pub fn reconcile(&mut self, listed: Vec<Device>) {
        let mut previous = std::mem::take(&mut self.devices);
        self.devices = listed
            .into_iter()
            .map(|mut device| {
                if let Some(pos) = previous.iter().position(|d| d.id == device.id) {
                    device.variables = previous.swap_remove(pos).variables;
                }
                device
            })
            .collect();

        for gone in previous {
            debug!(device = %gone.key(), "Device no longer listed");
        }
    }
}

/// The configured set of upsd servers, in polling order.
#[derive(Debug)]
pub struct DeviceRegistry<C> {
    hosts: Vec<HostEntry<C>>,
}

impl<C: UpsdClient> DeviceRegistry<C> {
    pub fn new(clients: impl IntoIterator<Item = C>) -> Self {
        Self {
            hosts: clients.into_iter().map(HostEntry::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn hosts(&self) -> &[HostEntry<C>] {
        &self.hosts
    }

    pub fn hosts_mut(&mut self) -> &mut [HostEntry<C>] {
        &mut self.hosts
    }
}

impl DeviceRegistry<TcpUpsdClient> {
    /// Build TCP clients for every configured host.
    pub fn from_addrs(addrs: &[HostAddr], timeout: Option<std::time::Duration>) -> Self {
        Self::new(
            addrs
                .iter()
                .map(|a| TcpUpsdClient::new(&a.host, a.port).with_timeout(timeout)),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Client answering from a table of canned responses.
    ///
    /// Responses can be swapped between calls to simulate a changing server.
    pub(crate) struct CannedClient {
        pub host: String,
        pub responses: Mutex<HashMap<String, String>>,
    }

    impl CannedClient {
        pub fn new(host: &str, responses: &[(&str, &str)]) -> Self {
            Self {
                host: host.to_string(),
                responses: Mutex::new(
                    responses
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
            }
        }

        pub fn set(&self, command: &str, response: &str) {
            self.responses
                .lock()
                .unwrap()
                .insert(command.to_string(), response.to_string());
        }
    }

    impl UpsdClient for CannedClient {
        fn host(&self) -> &str {
            &self.host
        }

        fn port(&self) -> u16 {
            crate::config::DEFAULT_UPSD_PORT
        }

        async fn request(&self, command: &Command) -> Result<String, UpsdError> {
            self.responses
                .lock()
                .unwrap()
                .get(&command.to_string())
                .cloned()
                .ok_or_else(|| UpsdError::Connection {
                    addr: self.host.clone(),
                    message: format!("no canned response for {}", command),
                })
        }
    }

    #[tokio::test]
    async fn test_list_devices() {
        let client = CannedClient::new(
            "host1",
            &[(
                "LIST UPS",
                "BEGIN LIST UPS\nUPS ups1 \"Rack UPS\"\nUPS ups2 \"Desk UPS\"\nEND LIST UPS\n",
            )],
        );

        let devices = list_devices(&client).await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].key(), DeviceKey::new("host1", "ups1"));
        assert_eq!(devices[1].description, "Desk UPS");
        assert!(devices[0].variables.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_and_merge_tracks_changes_and_removals() {
        let client = CannedClient::new(
            "host1",
            &[(
                "LIST VAR ups1",
                "BEGIN LIST VAR ups1\nVAR ups1 battery.charge \"100\"\nVAR ups1 ups.status \"OL\"\nEND LIST VAR ups1\n",
            )],
        );
        let mut device = Device::new("host1", "ups1", "");

        let first = fetch_and_merge(&client, &mut device).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(device.variables["ups.status"], "OL");

        client.set(
            "LIST VAR ups1",
            "BEGIN LIST VAR ups1\nVAR ups1 battery.charge \"97\"\nEND LIST VAR ups1\n",
        );
        let second = fetch_and_merge(&client, &mut device).await.unwrap();

        assert_eq!(second.len(), 2);
        assert_eq!(second["battery.charge"], "97");
        assert_eq!(second["ups.status"], "");
        assert_eq!(device.variables.len(), 1);
        assert_eq!(device.variables["battery.charge"], "97");
    }

    #[tokio::test]
    async fn test_fetch_and_merge_keeps_empty_values_reported_by_server() {
        let client = CannedClient::new(
            "host1",
            &[(
                "LIST VAR ups1",
                "BEGIN LIST VAR ups1\nVAR ups1 ups.alarm \"\"\nEND LIST VAR ups1\n",
            )],
        );
        let mut device = Device::new("host1", "ups1", "");

        fetch_and_merge(&client, &mut device).await.unwrap();
        assert_eq!(device.variables.get("ups.alarm").map(String::as_str), Some(""));
    }

    #[tokio::test]
    async fn test_fetch_and_merge_propagates_errors() {
        let client = CannedClient::new("host1", &[("LIST VAR ups1", "ERR UNKNOWN-UPS\n")]);
        let mut device = Device::new("host1", "ups1", "");

        let err = fetch_and_merge(&client, &mut device).await.unwrap_err();
        assert!(matches!(err, UpsdError::Server { .. }));
    }

    #[test]
    fn test_reconcile_keeps_survivor_variables() {
        let mut entry = HostEntry::new(CannedClient::new("host1", &[]));
        let mut ups1 = Device::new("host1", "ups1", "a");
        ups1.variables.insert("ups.load".into(), "12".into());
        entry.devices = vec![ups1, Device::new("host1", "gone", "b")];

        entry.reconcile(vec![
            Device::new("host1", "ups1", "a"),
            Device::new("host1", "new", "c"),
        ]);

        let ids: Vec<&str> = entry.devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["ups1", "new"]);
        assert_eq!(entry.devices[0].variables["ups.load"], "12");
        assert!(entry.devices[1].variables.is_empty());
    }

    #[test]
    fn test_registry_preserves_order() {
        let addrs = vec![
            HostAddr {
                host: "b".into(),
                port: 3493,
            },
            HostAddr {
                host: "a".into(),
                port: 3500,
            },
        ];
        let registry = DeviceRegistry::from_addrs(&addrs, None);
        let hosts: Vec<(&str, u16)> = registry
            .hosts()
            .iter()
            .map(|h| (h.client.host(), h.client.port()))
            .collect();
        assert_eq!(hosts, vec![("b", 3493), ("a", 3500)]);
    }
}
