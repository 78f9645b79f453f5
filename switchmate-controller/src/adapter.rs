//! Radio adapter interface
//!
//! The capability set the state machine consumes from the platform BLE
//! stack. Every operation completes asynchronously; unsolicited traffic
//! (discoveries, notifications, link loss) comes out of [`RadioAdapter::next_event`].

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

/// Opaque platform identifier of a peripheral
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a platform id (as rendered by the BLE stack) refers to us.
    /// UUID ids compare by value, anything else case-insensitively.
    pub fn matches(&self, other: &str) -> bool {
        match (Uuid::parse_str(&self.0), Uuid::parse_str(other)) {
            (Ok(ours), Ok(theirs)) => ours == theirs,
            _ => self.0.eq_ignore_ascii_case(other),
        }
    }
}

impl From<Uuid> for PeripheralId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string().to_uppercase())
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A peripheral seen while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// `<id> <rssi> <name>`, with `nil` for anything the advertisement left out
impl fmt::Display for DiscoveredPeripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.id)?;
        match self.rssi {
            Some(rssi) => write!(f, "{rssi} ")?,
            None => f.write_str("nil ")?,
        }
        f.write_str(self.name.as_deref().unwrap_or("nil"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("bluetooth error: {0}")]
    Platform(String),
    #[error("failed to scan: {0}")]
    Scan(String),
    #[error("error retrieving device {0}")]
    PeripheralNotFound(String),
    #[error("failed to connect to device: {0}")]
    Connect(String),
    #[error("not connected to a device")]
    NotConnected,
    #[error("failed to get service: {0}")]
    DiscoverServices(String),
    #[error("failed to get characteristic: {0}")]
    DiscoverCharacteristics(String),
    #[error("failed to subscribe to characteristic: {0}")]
    Subscribe(String),
    #[error("failed to write to characteristic: {0}")]
    Write(String),
    #[error("failed to disconnect: {0}")]
    Disconnect(String),
    #[error("device disconnected")]
    Disconnected,
    #[error("bluetooth event stream closed")]
    EventsClosed,
}

/// Traffic the adapter delivers without being asked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Discovered(DiscoveredPeripheral),
    ValueUpdated { characteristic: Uuid, value: Vec<u8> },
    Disconnected,
}

#[async_trait]
pub trait RadioAdapter: Send {
    /// Start scanning for peripherals advertising `service`. Results arrive
    /// as [`AdapterEvent::Discovered`] until [`stop_scan`](Self::stop_scan).
    async fn start_scan(&mut self, service: Uuid) -> Result<(), AdapterError>;

    async fn stop_scan(&mut self) -> Result<(), AdapterError>;

    /// Resolve `peripheral` and connect to it
    async fn connect(&mut self, peripheral: &PeripheralId) -> Result<(), AdapterError>;

    /// UUIDs of the connected peripheral's services matching `service`
    async fn discover_services(&mut self, service: Uuid) -> Result<Vec<Uuid>, AdapterError>;

    /// UUIDs of `service`'s characteristics matching `characteristic`
    async fn discover_characteristics(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<Uuid>, AdapterError>;

    /// Enable notifications; values arrive as [`AdapterEvent::ValueUpdated`]
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), AdapterError>;

    async fn write(
        &mut self,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), AdapterError>;

    async fn disconnect(&mut self) -> Result<(), AdapterError>;

    /// Next unsolicited event, `None` once the platform stops delivering them
    async fn next_event(&mut self) -> Option<AdapterEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovered_line() {
        let p = DiscoveredPeripheral {
            id: PeripheralId::new("6F3A2A52-8B1A-4C5E-9D0E-1F2A3B4C5D6E"),
            name: Some("Switchmate".to_string()),
            rssi: Some(-61),
        };
        assert_eq!(
            p.to_string(),
            "6F3A2A52-8B1A-4C5E-9D0E-1F2A3B4C5D6E -61 Switchmate"
        );

        let anonymous = DiscoveredPeripheral {
            name: None,
            rssi: None,
            ..p
        };
        assert_eq!(
            anonymous.to_string(),
            "6F3A2A52-8B1A-4C5E-9D0E-1F2A3B4C5D6E nil nil"
        );
    }

    #[test]
    fn id_matching() {
        let id = PeripheralId::new("6f3a2a52-8b1a-4c5e-9d0e-1f2a3b4c5d6e");
        assert!(id.matches("6F3A2A52-8B1A-4C5E-9D0E-1F2A3B4C5D6E"));
        assert!(!id.matches("00000000-8B1A-4C5E-9D0E-1F2A3B4C5D6E"));

        let mac = PeripheralId::new("hci0/dev_AA_BB_CC_DD_EE_FF");
        assert!(mac.matches("HCI0/DEV_AA_BB_CC_DD_EE_FF"));
    }
}
