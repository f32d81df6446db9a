use uuid::Uuid;

use crate::codec::Reading;
use crate::device::{DeviceAddress, DiscoveredDevice};
use crate::transport::GattStatus;
use crate::{Characteristic, Service};

/// Receives everything the session learns. Every method defaults to a no-op,
/// so implementors only override what they display.
#[allow(unused_variables)]
pub trait SessionObserver: Send {
    fn on_device_found(&mut self, device: &DiscoveredDevice) {}

    fn on_connected(&mut self, address: &DeviceAddress) {}

    fn on_disconnected(&mut self, address: &DeviceAddress) {}

    fn on_services_available(&mut self, services: &[Service]) {}

    fn on_characteristics_for_service(
        &mut self,
        service: &Service,
        characteristics: &[Characteristic],
    ) {
    }

    /// A fresh value arrived, either from a read or from a notification.
    fn on_characteristic_value(&mut self, characteristic: &Characteristic, reading: Reading) {}

    /// Sent after the value of a notification has been delivered.
    fn on_notification(&mut self, characteristic: &Characteristic) {}

    fn on_read_failed(&mut self, characteristic: &Characteristic, status: GattStatus) {}

    fn on_write_succeeded(&mut self, characteristic: &Characteristic, description: &str) {}

    fn on_write_failed(&mut self, characteristic: &Characteristic, description: &str) {}

    fn on_descriptor_write_failed(
        &mut self,
        characteristic: &Characteristic,
        descriptor: Uuid,
        status: GattStatus,
    ) {
    }

    fn on_rssi_updated(&mut self, rssi: i16) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}
