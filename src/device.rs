use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

/// Opaque peripheral address, e.g. `"C4:7C:8D:6A:2F:01"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Addresses compare case-insensitively on the wire.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Advertisement payload as reported by the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: Option<String>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub services: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: DeviceAddress,
    /// Signal strength
    pub rssi: Option<i16>,
    pub advertisement: Advertisement,
}

impl DiscoveredDevice {
    /// Local name of the device
    #[inline]
    pub fn local_name(&self) -> Option<&str> {
        self.advertisement.local_name.as_deref()
    }
}
