//! The capability set the session needs from a BLE stack.

use std::fmt;

use crate::characteristic::{Characteristic, Descriptor};
use crate::device::DeviceAddress;
use crate::Result;

/// Identifies one connection object handed out by a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub address: DeviceAddress,
}

/// Status code attached to every request completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattStatus(pub u16);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0x0000);
    pub const FAILURE: GattStatus = GattStatus(0x0101);

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A BLE stack as seen by the [`Session`](crate::Session).
///
/// Requests are fire-and-forget: their completion is reported later as a
/// [`SessionEvent`](crate::SessionEvent) tagged with the connection id. The
/// stack allows one outstanding request per connection; implementations run
/// the requests of a connection in the order they were issued.
pub trait Transport: Send {
    fn check_hardware_available(&self) -> bool;

    fn is_radio_enabled(&self) -> bool;

    /// Starts reporting [`SessionEvent::DeviceFound`](crate::SessionEvent::DeviceFound).
    fn start_scan(&mut self) -> Result<()>;

    fn stop_scan(&mut self);

    /// Resolves `address` and opens a new connection object to it.
    fn connect(&mut self, address: &DeviceAddress) -> Result<ConnectionHandle>;

    /// Reconnects an existing connection object. Returns `false` if the
    /// transport no longer knows the handle.
    fn reconnect(&mut self, handle: &ConnectionHandle) -> bool;

    fn disconnect(&mut self, handle: &ConnectionHandle);

    /// Releases the connection object permanently.
    fn close(&mut self, handle: &ConnectionHandle);

    fn discover_services(&mut self, handle: &ConnectionHandle);

    fn read_characteristic(&mut self, handle: &ConnectionHandle, characteristic: &Characteristic);

    fn write_characteristic(
        &mut self,
        handle: &ConnectionHandle,
        characteristic: &Characteristic,
        value: &[u8],
    );

    /// Toggles local delivery of notifications. Returns `false` if the toggle
    /// cannot be issued. A toggle that fails later is reported as a failed
    /// write of the client characteristic configuration descriptor.
    fn set_notification(
        &mut self,
        handle: &ConnectionHandle,
        characteristic: &Characteristic,
        enabled: bool,
    ) -> bool;

    fn write_descriptor(
        &mut self,
        handle: &ConnectionHandle,
        descriptor: &Descriptor,
        value: &[u8],
    );

    fn read_rssi(&mut self, handle: &ConnectionHandle);
}
