//! [`Transport`] implementation over btleplug.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use btleplug::api::{
    BDAddr, Central, CentralEvent, CharPropFlags, Characteristic as BtleCharacteristic,
    Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use stream_cancel::{Trigger, Valve, Valved};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::characteristic::{CharacteristicKey, Descriptor};
use crate::common::{self, descriptors};
use crate::device::{Advertisement, DeviceAddress, DiscoveredDevice};
use crate::event::{EventSender, SessionEvent};
use crate::transport::{ConnectionHandle, ConnectionId, GattStatus, Transport};
use crate::{Characteristic, Error, Result, Service};

#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Index of the Bluetooth adapter to use. The first found adapter is used by default.
    adapter_index: usize,
}

impl TransportConfig {
    /// Index of bluetooth adapter to use
    pub fn adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }
}

/// State shared with the spawned btleplug tasks.
struct Shared {
    adapter: Adapter,
    events: EventSender,
    /// Whether scan results are forwarded
    scanning: AtomicBool,
    /// Peripherals seen by the adapter, by address
    known: Mutex<HashMap<BDAddr, Peripheral>>,
    /// Open connection objects
    connections: Mutex<HashMap<PeripheralId, ConnectionId>>,
}

impl Shared {
    fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            log::trace!("Session is gone, dropping event");
        }
    }

    async fn on_device_seen(&self, peripheral_id: PeripheralId) {
        let Ok(peripheral) = self.adapter.peripheral(&peripheral_id).await else {
            return;
        };

        self.known
            .lock()
            .unwrap()
            .insert(peripheral.address(), peripheral.clone());

        if !self.scanning.load(Ordering::SeqCst) {
            return;
        }

        let properties = peripheral.properties().await.ok().flatten();
        let device = DiscoveredDevice {
            address: DeviceAddress::new(peripheral.address().to_string()),
            rssi: properties.as_ref().and_then(|props| props.rssi),
            advertisement: properties
                .map(|props| Advertisement {
                    local_name: props.local_name,
                    manufacturer_data: props.manufacturer_data,
                    services: props.services,
                })
                .unwrap_or_default(),
        };

        log::trace!("Device discovered: {:?}", device);
        self.send(SessionEvent::DeviceFound(device));
    }

    fn on_connection_changed(&self, peripheral_id: &PeripheralId, connected: bool) {
        let connection = self.connections.lock().unwrap().get(peripheral_id).copied();

        if let Some(connection) = connection {
            log::trace!("Connection {} changed: connected={}", connection, connected);
            self.send(SessionEvent::ConnectionStateChanged {
                connection,
                connected,
            });
        }
    }

    async fn listen(
        self: Arc<Self>,
        mut event_stream: Valved<Pin<Box<dyn Stream<Item = CentralEvent> + Send>>>,
    ) {
        while let Some(event) = event_stream.next().await {
            match event {
                CentralEvent::DeviceDiscovered(peripheral_id)
                | CentralEvent::DeviceUpdated(peripheral_id) => {
                    self.on_device_seen(peripheral_id).await;
                }
                CentralEvent::DeviceConnected(peripheral_id) => {
                    self.on_connection_changed(&peripheral_id, true);
                }
                CentralEvent::DeviceDisconnected(peripheral_id) => {
                    self.on_connection_changed(&peripheral_id, false);
                }
                _ => {}
            }
        }

        log::info!("Central event listener was stopped.");
    }
}

/// Runs the GATT requests of one connection one after another, so at most one
/// is outstanding at a time.
struct RequestQueue {
    requests: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

impl RequestQueue {
    fn spawn(runtime: &Handle) -> Self {
        let (requests, pending) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();

        runtime.spawn(async move {
            let mut pending = UnboundedReceiverStream::new(pending);
            while let Some(request) = pending.next().await {
                request.await;
            }
        });

        Self { requests }
    }

    fn push(&self, request: impl Future<Output = ()> + Send + 'static) {
        if self.requests.send(request.boxed()).is_err() {
            log::warn!("Request queue is gone, dropping request");
        }
    }
}

/// btleplug writes the client characteristic configuration descriptor itself
/// when subscribing.
fn written_by_subscription(descriptor: Uuid) -> bool {
    descriptor == descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION
}

pub struct BtleplugTransport {
    _manager: Manager,
    shared: Arc<Shared>,
    runtime: Handle,
    peripherals: HashMap<ConnectionId, Peripheral>,
    queues: HashMap<ConnectionId, RequestQueue>,
    /// Stops the notification forwarder of each connection
    forwarders: HashMap<ConnectionId, Trigger>,
    next_id: u64,
    _listener: Trigger,
}

impl BtleplugTransport {
    /// Opens the configured adapter and starts listening for its events.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(config: TransportConfig, events: EventSender) -> Result<Self> {
        let manager = Manager::new().await?;
        let mut adapters = manager.adapters().await?;

        if config.adapter_index >= adapters.len() {
            return Err(Error::HardwareUnavailable);
        }

        let adapter = adapters.swap_remove(config.adapter_index);

        log::trace!("Using adapter: {:?}", adapter);

        let (listener, central_events) = Valved::new(adapter.events().await?);
        let shared = Arc::new(Shared {
            adapter,
            events,
            scanning: AtomicBool::new(false),
            known: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        });

        let runtime = Handle::current();
        runtime.spawn(shared.clone().listen(central_events));

        Ok(Self {
            _manager: manager,
            shared,
            runtime,
            peripherals: HashMap::new(),
            queues: HashMap::new(),
            forwarders: HashMap::new(),
            next_id: 0,
            _listener: listener,
        })
    }

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(task);
    }

    fn peripheral(&self, handle: &ConnectionHandle) -> Option<Peripheral> {
        let peripheral = self.peripherals.get(&handle.id).cloned();
        if peripheral.is_none() {
            log::warn!("Unknown connection {} to {}", handle.id, handle.address);
        }
        peripheral
    }

    /// Peripheral and request queue of a live connection object.
    fn request(&self, handle: &ConnectionHandle) -> Option<(Peripheral, &RequestQueue)> {
        let peripheral = self.peripheral(handle)?;
        let queue = self.queues.get(&handle.id)?;
        Some((peripheral, queue))
    }

    /// Connects and, once up, forwards the peripheral's notifications.
    /// A previous forwarder of the same connection is stopped.
    fn spawn_connect(&mut self, connection: ConnectionId, peripheral: Peripheral) {
        let (trigger, valve) = Valve::new();
        self.forwarders.insert(connection, trigger);

        let shared = self.shared.clone();
        self.spawn(async move {
            if let Err(e) = peripheral.connect().await {
                log::warn!("Could not connect to {}: {:?}", peripheral.address(), e);
                shared.send(SessionEvent::ConnectionStateChanged {
                    connection,
                    connected: false,
                });
                return;
            }

            shared.send(SessionEvent::ConnectionStateChanged {
                connection,
                connected: true,
            });

            let notifications = match peripheral.notifications().await {
                Ok(notifications) => notifications,
                Err(e) => {
                    log::warn!("No notification stream for {}: {:?}", peripheral.address(), e);
                    return;
                }
            };

            let mut notifications = valve.wrap(notifications);
            while let Some(notification) = notifications.next().await {
                let service = peripheral
                    .characteristics()
                    .into_iter()
                    .find(|c| c.uuid == notification.uuid)
                    .map(|c| c.service_uuid);

                match service {
                    Some(service) => shared.send(SessionEvent::CharacteristicChanged {
                        connection,
                        key: CharacteristicKey::new(service, notification.uuid),
                        value: notification.value,
                    }),
                    None => log::debug!(
                        "Notification from unknown characteristic {}",
                        notification.uuid
                    ),
                }
            }

            log::debug!("Notification forwarder of {} stopped", connection);
        });
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    key: &CharacteristicKey,
) -> Option<BtleCharacteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == key.characteristic && c.service_uuid == key.service)
}

fn status_of<T>(result: &btleplug::Result<T>) -> GattStatus {
    match result {
        Ok(_) => GattStatus::SUCCESS,
        Err(e) => {
            log::warn!("Request failed: {:?}", e);
            GattStatus::FAILURE
        }
    }
}

impl Transport for BtleplugTransport {
    fn check_hardware_available(&self) -> bool {
        // An adapter was opened in `new`.
        true
    }

    fn is_radio_enabled(&self) -> bool {
        // btleplug does not report the radio power state portably; a powered
        // off radio surfaces as failing requests instead.
        true
    }

    fn start_scan(&mut self) -> Result<()> {
        self.shared.scanning.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        self.spawn(async move {
            if let Err(e) = shared.adapter.start_scan(ScanFilter::default()).await {
                log::error!("Could not start the scan: {:?}", e);
                shared.scanning.store(false, Ordering::SeqCst);
            }
        });

        Ok(())
    }

    fn stop_scan(&mut self) {
        self.shared.scanning.store(false, Ordering::SeqCst);

        let shared = self.shared.clone();
        self.spawn(async move {
            shared.adapter.stop_scan().await.ok();
        });
    }

    fn connect(&mut self, address: &DeviceAddress) -> Result<ConnectionHandle> {
        let invalid = || Error::InvalidAddress(address.to_string());

        let bd_addr = BDAddr::from_str(address.as_str()).map_err(|_| invalid())?;
        let peripheral = self
            .shared
            .known
            .lock()
            .unwrap()
            .get(&bd_addr)
            .cloned()
            .ok_or_else(invalid)?;

        self.next_id += 1;
        let connection = ConnectionId(self.next_id);

        self.shared
            .connections
            .lock()
            .unwrap()
            .insert(peripheral.id(), connection);
        self.peripherals.insert(connection, peripheral.clone());
        self.queues
            .insert(connection, RequestQueue::spawn(&self.runtime));

        log::debug!("Connecting to device {}", address);
        self.spawn_connect(connection, peripheral);

        Ok(ConnectionHandle {
            id: connection,
            address: address.clone(),
        })
    }

    fn reconnect(&mut self, handle: &ConnectionHandle) -> bool {
        let Some(peripheral) = self.peripheral(handle) else {
            return false;
        };

        self.spawn_connect(handle.id, peripheral);
        true
    }

    fn disconnect(&mut self, handle: &ConnectionHandle) {
        let Some(peripheral) = self.peripheral(handle) else {
            return;
        };

        self.spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                log::warn!("Could not disconnect from {}: {:?}", peripheral.address(), e);
            }
        });
    }

    fn close(&mut self, handle: &ConnectionHandle) {
        self.forwarders.remove(&handle.id);
        self.queues.remove(&handle.id);

        let Some(peripheral) = self.peripherals.remove(&handle.id) else {
            return;
        };
        self.shared
            .connections
            .lock()
            .unwrap()
            .remove(&peripheral.id());

        self.spawn(async move {
            if peripheral.is_connected().await.unwrap_or(false) {
                peripheral.disconnect().await.ok();
            }
        });
    }

    fn discover_services(&mut self, handle: &ConnectionHandle) {
        let Some((peripheral, queue)) = self.request(handle) else {
            return;
        };

        let connection = handle.id;
        let shared = self.shared.clone();
        queue.push(async move {
            let result = peripheral.discover_services().await;
            let status = status_of(&result);
            let services = if status.is_success() {
                peripheral
                    .services()
                    .iter()
                    .map(Service::from)
                    .collect::<Vec<_>>()
            } else {
                Vec::new()
            };

            shared.send(SessionEvent::ServicesDiscovered {
                connection,
                status,
                services,
            });
        });
    }

    fn read_characteristic(&mut self, handle: &ConnectionHandle, characteristic: &Characteristic) {
        let Some((peripheral, queue)) = self.request(handle) else {
            return;
        };

        let connection = handle.id;
        let key = characteristic.key();
        let shared = self.shared.clone();
        queue.push(async move {
            let (status, value) = match find_characteristic(&peripheral, &key) {
                Some(target) => {
                    let result = peripheral.read(&target).await;
                    (status_of(&result), result.unwrap_or_default())
                }
                None => (GattStatus::FAILURE, Vec::new()),
            };

            shared.send(SessionEvent::CharacteristicRead {
                connection,
                key,
                status,
                value,
            });
        });
    }

    fn write_characteristic(
        &mut self,
        handle: &ConnectionHandle,
        characteristic: &Characteristic,
        value: &[u8],
    ) {
        let Some((peripheral, queue)) = self.request(handle) else {
            return;
        };

        let write_type = if characteristic.properties().contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        let connection = handle.id;
        let key = characteristic.key();
        let value = value.to_vec();
        let shared = self.shared.clone();
        queue.push(async move {
            let status = match find_characteristic(&peripheral, &key) {
                Some(target) => status_of(&peripheral.write(&target, &value, write_type).await),
                None => GattStatus::FAILURE,
            };

            shared.send(SessionEvent::CharacteristicWritten {
                connection,
                key,
                status,
            });
        });
    }

    /// Queues a subscribe or unsubscribe. btleplug writes the configuration
    /// descriptor as part of it, so a failure is reported as a failed write of
    /// that descriptor.
    fn set_notification(
        &mut self,
        handle: &ConnectionHandle,
        characteristic: &Characteristic,
        enabled: bool,
    ) -> bool {
        if !characteristic.can_notify() {
            return false;
        }

        let Some((peripheral, queue)) = self.request(handle) else {
            return false;
        };

        let connection = handle.id;
        let key = characteristic.key();
        let shared = self.shared.clone();
        queue.push(async move {
            let status = match find_characteristic(&peripheral, &key) {
                Some(target) => {
                    let result = if enabled {
                        peripheral.subscribe(&target).await
                    } else {
                        peripheral.unsubscribe(&target).await
                    };
                    status_of(&result)
                }
                None => GattStatus::FAILURE,
            };

            if !status.is_success() {
                log::warn!(
                    "Could not toggle notifications of {}",
                    common::display_name(key.characteristic)
                );
                shared.send(SessionEvent::DescriptorWritten {
                    connection,
                    key,
                    descriptor: descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION,
                    status,
                });
            }
        });

        true
    }

    fn write_descriptor(
        &mut self,
        handle: &ConnectionHandle,
        descriptor: &Descriptor,
        value: &[u8],
    ) {
        if written_by_subscription(descriptor.uuid) {
            log::debug!(
                "{} of {} was written by the subscription",
                common::display_name(descriptor.uuid),
                common::display_name(descriptor.characteristic.characteristic)
            );
            return;
        }

        let Some((peripheral, queue)) = self.request(handle) else {
            return;
        };

        let connection = handle.id;
        let key = descriptor.characteristic;
        let uuid = descriptor.uuid;
        let value = value.to_vec();
        let shared = self.shared.clone();
        queue.push(async move {
            let target = find_characteristic(&peripheral, &key)
                .and_then(|c| c.descriptors.into_iter().find(|d| d.uuid == uuid));

            let status = match target {
                Some(target) => status_of(&peripheral.write_descriptor(&target, &value).await),
                None => GattStatus::FAILURE,
            };

            shared.send(SessionEvent::DescriptorWritten {
                connection,
                key,
                descriptor: uuid,
                status,
            });
        });
    }

    fn read_rssi(&mut self, handle: &ConnectionHandle) {
        let Some((peripheral, queue)) = self.request(handle) else {
            return;
        };

        let connection = handle.id;
        let shared = self.shared.clone();
        queue.push(async move {
            let rssi = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|props| props.rssi);

            let (status, rssi) = match rssi {
                Some(rssi) => (GattStatus::SUCCESS, rssi),
                None => (GattStatus::FAILURE, 0),
            };

            shared.send(SessionEvent::RssiRead {
                connection,
                status,
                rssi,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::characteristics::HEART_RATE_MEASUREMENT;
    use tokio::sync::oneshot;

    #[test]
    fn only_the_configuration_descriptor_is_left_to_the_subscription() {
        assert!(written_by_subscription(
            descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION
        ));
        assert!(!written_by_subscription(HEART_RATE_MEASUREMENT));
    }

    #[tokio::test]
    async fn queued_requests_run_one_at_a_time_in_order() {
        let queue = RequestQueue::spawn(&Handle::current());
        let log = Arc::new(Mutex::new(Vec::new()));

        for id in 1..=3 {
            let log = log.clone();
            queue.push(async move {
                log.lock().unwrap().push(format!("start {}", id));
                tokio::task::yield_now().await;
                log.lock().unwrap().push(format!("end {}", id));
            });
        }

        let (done, finished) = oneshot::channel();
        queue.push(async move {
            done.send(()).ok();
        });
        finished.await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 1", "end 1", "start 2", "end 2", "start 3", "end 3"]
        );
    }
}
