use std::collections::HashMap;
use std::time::Duration;

use btleplug::api::CharPropFlags;
use uuid::Uuid;

use crate::characteristic::CharacteristicKey;
use crate::codec;
use crate::common::{self, descriptors};
use crate::device::{DeviceAddress, DiscoveredDevice};
use crate::event::{EventSender, SessionEvent};
use crate::service::find_characteristic;
use crate::transport::{ConnectionHandle, GattStatus, Transport};
use crate::{Characteristic, Error, Result, Service, SessionObserver};

/// How often the signal strength of a live connection is polled by default.
pub const RSSI_UPDATE_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between two RSSI reads while connected.
    rssi_interval: Duration,
    /// Whether RSSI polling is armed automatically on connect.
    rssi_polling: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rssi_interval: RSSI_UPDATE_INTERVAL,
            rssi_polling: true,
        }
    }
}

impl SessionConfig {
    /// Delay between two RSSI reads
    pub fn rssi_interval(mut self, interval: Duration) -> Self {
        self.rssi_interval = interval;
        self
    }

    /// Arm RSSI polling automatically when a connection comes up
    pub fn rssi_polling(mut self, enabled: bool) -> Self {
        self.rssi_polling = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    /// Connected, waiting for service discovery to complete.
    DiscoveringServices,
    Ready,
    /// The connection object is kept for a fast reconnect.
    Disconnected,
}

/// Owns one peripheral connection and everything learned through it.
///
/// All mutation goes through `&mut self`: transport completions arrive as
/// [`SessionEvent`]s and must be fed to [`handle_event`](Session::handle_event)
/// one at a time, e.g. by [`dispatch`](crate::dispatch).
pub struct Session<T, O> {
    transport: T,
    observer: O,
    config: SessionConfig,
    /// Loopback used by the RSSI timer
    events: EventSender,
    state: SessionState,
    connection: Option<ConnectionHandle>,
    device: Option<DeviceAddress>,
    connected: bool,
    /// A connect or reconnect was issued and its completion is still wanted
    connect_pending: bool,
    /// Advertised local names by uppercase address
    names: HashMap<String, String>,
    services: Vec<Service>,
    selected_service: Option<Uuid>,
    /// Last raw value per characteristic, from reads and notifications only
    values: HashMap<CharacteristicKey, Vec<u8>>,
    rssi_polling: bool,
    rssi_tick_pending: bool,
}

impl<T, O> Session<T, O>
where
    T: Transport,
    O: SessionObserver,
{
    pub fn new(transport: T, observer: O, config: SessionConfig, events: EventSender) -> Self {
        Self {
            transport,
            observer,
            config,
            events,
            state: SessionState::Idle,
            connection: None,
            device: None,
            connected: false,
            connect_pending: false,
            names: HashMap::new(),
            services: Vec::new(),
            selected_service: None,
            values: HashMap::new(),
            rssi_polling: false,
            rssi_tick_pending: false,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn device(&self) -> Option<&DeviceAddress> {
        self.device.as_ref()
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    /// Services from the last successful discovery.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn selected_service(&self) -> Option<&Service> {
        let uuid = self.selected_service?;
        self.services.iter().find(|service| service.uuid() == uuid)
    }

    pub fn characteristic(&self, key: &CharacteristicKey) -> Option<&Characteristic> {
        find_characteristic(&self.services, key)
    }

    /// Last raw value received for a characteristic.
    pub fn value(&self, key: &CharacteristicKey) -> Option<&[u8]> {
        self.values.get(key).map(Vec::as_slice)
    }

    #[inline]
    pub fn is_rssi_polling(&self) -> bool {
        self.rssi_polling
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Checks that BLE hardware is present and the radio is on.
    pub fn initialize(&self) -> Result<()> {
        if !self.transport.check_hardware_available() {
            return Err(Error::HardwareUnavailable);
        }

        if !self.transport.is_radio_enabled() {
            return Err(Error::RadioDisabled);
        }

        Ok(())
    }

    /// Start scanning for ble devices.
    pub fn start_scan(&mut self) -> Result<()> {
        match self.state {
            SessionState::Scanning => {
                log::info!("Scan is already running.");
                Ok(())
            }
            SessionState::Idle | SessionState::Disconnected => {
                log::info!("Starting the scan");
                self.transport.start_scan()?;
                self.state = SessionState::Scanning;
                Ok(())
            }
            state => Err(Error::InvalidState(state)),
        }
    }

    /// Stop scanning for ble devices.
    pub fn stop_scan(&mut self) {
        if self.state != SessionState::Scanning {
            log::info!("Scan is already stopped");
            return;
        }

        self.transport.stop_scan();
        self.state = self.resting_state();
        log::info!("Scan was stopped.");
    }

    /// Connects to `address`.
    ///
    /// An existing connection object for the same address is reconnected
    /// instead of rebuilt; one for another address is closed first.
    pub fn connect(&mut self, address: impl Into<DeviceAddress>) -> Result<()> {
        let address = address.into();

        if self.state == SessionState::Scanning {
            self.stop_scan();
        }

        if let Some(handle) = self
            .connection
            .clone()
            .filter(|handle| handle.address.matches(address.as_str()))
        {
            log::info!("Reconnecting to {} ({})", handle.address, handle.id);

            if !self.transport.reconnect(&handle) {
                return Err(Error::ReconnectRejected(address));
            }
            if !self.connected {
                self.connect_pending = true;
                self.state = SessionState::Connecting;
            }
            return Ok(());
        }

        if let Some(previous) = self.connection.take() {
            log::info!(
                "Closing connection to {} before connecting to {}",
                previous.address,
                address
            );
            self.release(previous);
        }

        self.services.clear();
        self.values.clear();
        self.selected_service = None;
        self.device = None;
        self.state = SessionState::Idle;

        let handle = self.transport.connect(&address)?;
        log::info!("Connecting to {} ({})", address, handle.id);

        self.device = Some(address);
        self.connection = Some(handle);
        self.connected = false;
        self.connect_pending = true;
        self.state = SessionState::Connecting;

        Ok(())
    }

    /// Disconnects but keeps the connection object for a fast reconnect.
    ///
    /// Also cancels a pending connect: its late completion is dropped.
    pub fn disconnect(&mut self) {
        let Some(handle) = self.connection.clone() else {
            log::info!("No connection to disconnect");
            return;
        };

        if !self.connected && !self.connect_pending {
            log::info!("{} is already disconnected", handle.address);
            return;
        }

        log::info!("Disconnecting from {}", handle.address);
        self.transport.disconnect(&handle);

        self.connected = false;
        self.connect_pending = false;
        self.stop_rssi_polling();
        if self.state != SessionState::Scanning {
            self.state = SessionState::Disconnected;
        }
        self.observer.on_disconnected(&handle.address);
    }

    /// Releases the connection object for good. Calling it again is a no-op.
    pub fn close(&mut self) {
        let Some(handle) = self.connection.take() else {
            log::debug!("Session is already closed");
            return;
        };

        self.release(handle);

        self.device = None;
        self.services.clear();
        self.values.clear();
        self.selected_service = None;
        if self.state != SessionState::Scanning {
            self.state = SessionState::Idle;
        }
    }

    fn release(&mut self, handle: ConnectionHandle) {
        log::info!("Closing connection {} to {}", handle.id, handle.address);
        self.transport.close(&handle);
        self.stop_rssi_polling();
        self.connect_pending = false;

        if std::mem::replace(&mut self.connected, false) {
            self.observer.on_disconnected(&handle.address);
        }
    }

    fn resting_state(&self) -> SessionState {
        if self.connection.is_some() {
            SessionState::Disconnected
        } else {
            SessionState::Idle
        }
    }

    /// Publishes the characteristics of a discovered service and remembers
    /// it as the selected one.
    pub fn select_service(&mut self, uuid: Uuid) -> Result<()> {
        let service = self
            .services
            .iter()
            .find(|service| service.uuid() == uuid)
            .ok_or(Error::UnknownService(uuid))?;

        self.observer
            .on_characteristics_for_service(service, service.characteristics());
        self.selected_service = Some(uuid);

        Ok(())
    }

    /// Requests the current value; it arrives through
    /// [`SessionObserver::on_characteristic_value`].
    ///
    /// Requests on one connection complete in the order they were issued.
    pub fn read_characteristic(&mut self, key: &CharacteristicKey) -> Result<()> {
        let (handle, characteristic) = self.request_target(key)?;

        log::debug!("Reading {}", common::display_name(key.characteristic));
        self.transport.read_characteristic(&handle, &characteristic);

        Ok(())
    }

    pub fn write_characteristic(&mut self, key: &CharacteristicKey, value: &[u8]) -> Result<()> {
        let (handle, characteristic) = self.request_target(key)?;

        log::debug!(
            "Writing {} to {}",
            codec::hex_string(value),
            common::display_name(key.characteristic)
        );
        self.transport
            .write_characteristic(&handle, &characteristic, value);

        Ok(())
    }

    /// Turns notifications on or off, locally and on the peripheral.
    ///
    /// The client characteristic configuration descriptor is written only
    /// after the local toggle took effect. A characteristic without that
    /// descriptor keeps the local toggle and skips the remote write.
    pub fn set_notification(&mut self, key: &CharacteristicKey, enabled: bool) -> Result<()> {
        let (handle, characteristic) = self.request_target(key)?;

        if !self
            .transport
            .set_notification(&handle, &characteristic, enabled)
        {
            log::error!(
                "Setting notification status for {} failed",
                common::display_name(key.characteristic)
            );
            return Err(Error::NotificationRejected(key.characteristic));
        }

        let Some(descriptor) =
            characteristic.descriptor(descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION)
        else {
            log::warn!(
                "{} has no client characteristic configuration descriptor, peripheral-side toggle skipped",
                common::display_name(key.characteristic)
            );
            return Ok(());
        };

        let properties = characteristic.properties();
        let payload = if !enabled {
            descriptors::DISABLE_NOTIFICATION_VALUE
        } else if properties.contains(CharPropFlags::INDICATE)
            && !properties.contains(CharPropFlags::NOTIFY)
        {
            descriptors::ENABLE_INDICATION_VALUE
        } else {
            descriptors::ENABLE_NOTIFICATION_VALUE
        };

        self.transport
            .write_descriptor(&handle, descriptor, &payload);

        Ok(())
    }

    fn request_target(
        &self,
        key: &CharacteristicKey,
    ) -> Result<(ConnectionHandle, Characteristic)> {
        let handle = match &self.connection {
            Some(handle) if self.connected => handle.clone(),
            _ => return Err(Error::NotConnected),
        };

        let characteristic = find_characteristic(&self.services, key)
            .cloned()
            .ok_or(Error::UnknownCharacteristic(key.characteristic))?;

        Ok((handle, characteristic))
    }

    /// Arms periodic RSSI reads. Has no effect without a live connection.
    pub fn start_rssi_polling(&mut self) {
        self.rssi_polling = true;

        if !self.connected || self.connection.is_none() {
            self.rssi_polling = false;
            return;
        }

        self.arm_rssi_timer();
    }

    /// The pending timer firing, if any, exits without re-arming.
    pub fn stop_rssi_polling(&mut self) {
        self.rssi_polling = false;
    }

    fn arm_rssi_timer(&mut self) {
        if self.rssi_tick_pending {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("RSSI polling needs a tokio runtime: {}", e);
                self.rssi_polling = false;
                return;
            }
        };

        let events = self.events.clone();
        let interval = self.config.rssi_interval;
        runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            events.send(SessionEvent::RssiTick).ok();
        });
        self.rssi_tick_pending = true;
    }

    /// Applies one event to the state machine.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if let Err(e) = self.check_live(&event) {
            log::debug!("Dropping event: {}", e);
            return;
        }

        match event {
            SessionEvent::DeviceFound(device) => self.on_device_found(device),
            SessionEvent::ConnectionStateChanged {
                connected: true, ..
            } => self.on_connected(),
            SessionEvent::ConnectionStateChanged {
                connected: false, ..
            } => self.on_disconnected(),
            SessionEvent::ServicesDiscovered {
                status, services, ..
            } => self.on_services_discovered(status, services),
            SessionEvent::CharacteristicRead {
                key, status, value, ..
            } => self.on_characteristic_read(key, status, value),
            SessionEvent::CharacteristicChanged { key, value, .. } => {
                self.on_characteristic_changed(key, value)
            }
            SessionEvent::CharacteristicWritten { key, status, .. } => {
                self.on_characteristic_written(key, status)
            }
            SessionEvent::DescriptorWritten {
                key,
                descriptor,
                status,
                ..
            } => self.on_descriptor_written(key, descriptor, status),
            SessionEvent::RssiRead { status, rssi, .. } => self.on_rssi_read(status, rssi),
            SessionEvent::RssiTick => self.on_rssi_tick(),
        }
    }

    /// Connection-scoped events must come from the live connection object;
    /// all but connection-state changes also need the link to be up.
    fn check_live(&self, event: &SessionEvent) -> Result<()> {
        let Some(connection) = event.connection() else {
            return Ok(());
        };

        let current = matches!(&self.connection, Some(handle) if handle.id == connection);
        let needs_link = !matches!(event, SessionEvent::ConnectionStateChanged { .. });

        if !current || (needs_link && !self.connected) {
            return Err(Error::StaleCallback(connection));
        }

        Ok(())
    }

    fn current_address(&self) -> String {
        self.connection
            .as_ref()
            .map(|handle| handle.address.to_string())
            .unwrap_or_default()
    }

    /// Advertised name of the connected device, or its address if none was seen.
    fn current_device_name(&self) -> String {
        let address = self.current_address();
        self.names
            .get(&address.to_ascii_uppercase())
            .cloned()
            .unwrap_or(address)
    }

    fn on_device_found(&mut self, device: DiscoveredDevice) {
        if self.state != SessionState::Scanning {
            log::trace!("Ignoring scan result outside of a scan: {}", device.address);
            return;
        }

        log::trace!("Device discovered: {:?}", device);
        if let Some(name) = device.local_name() {
            self.names
                .insert(device.address.as_str().to_ascii_uppercase(), name.to_owned());
        }
        self.observer.on_device_found(&device);
    }

    fn on_connected(&mut self) {
        let Some(handle) = self.connection.clone() else {
            return;
        };

        if self.connected {
            log::debug!("{} is already connected", handle.address);
            return;
        }

        // Only a connect issued by the session may bring the link up. A late
        // completion after disconnect() or an unsolicited one during a scan
        // is torn down again.
        if !self.connect_pending {
            log::debug!(
                "Dropping event: {}, no connect is pending",
                Error::StaleCallback(handle.id)
            );
            self.transport.disconnect(&handle);
            return;
        }

        log::info!("Connected to {}", handle.address);
        self.connected = true;
        self.connect_pending = false;
        self.state = SessionState::DiscoveringServices;
        self.observer.on_connected(&handle.address);

        self.transport.read_rssi(&handle);
        self.transport.discover_services(&handle);

        if self.config.rssi_polling {
            self.start_rssi_polling();
        }
    }

    fn on_disconnected(&mut self) {
        let Some(handle) = self.connection.clone() else {
            return;
        };

        let was_connected = std::mem::replace(&mut self.connected, false);
        let was_connecting = std::mem::replace(&mut self.connect_pending, false);
        self.stop_rssi_polling();

        if self.state != SessionState::Scanning {
            self.state = SessionState::Disconnected;
        }

        if was_connected || was_connecting {
            log::info!("Disconnected from {}", handle.address);
            self.observer.on_disconnected(&handle.address);
        } else {
            log::debug!("Disconnect from {} confirmed", handle.address);
        }
    }

    fn on_services_discovered(&mut self, status: GattStatus, services: Vec<Service>) {
        if !status.is_success() {
            log::warn!(
                "Service discovery on {} failed: {}",
                self.current_address(),
                Error::RequestFailedStatus(status)
            );
            return;
        }

        log::info!("Discovered {} services", services.len());
        self.services = services;
        self.state = SessionState::Ready;

        let services = &self.services;
        self.values
            .retain(|key, _| find_characteristic(services, key).is_some());
        if let Some(uuid) = self.selected_service {
            if !services.iter().any(|service| service.uuid() == uuid) {
                self.selected_service = None;
            }
        }

        self.observer.on_services_available(&self.services);
    }

    fn on_characteristic_read(
        &mut self,
        key: CharacteristicKey,
        status: GattStatus,
        value: Vec<u8>,
    ) {
        let Some(characteristic) = find_characteristic(&self.services, &key) else {
            log::debug!("Read completion for unknown characteristic {}", key.characteristic);
            return;
        };

        if !status.is_success() {
            log::warn!(
                "Reading {} failed: {}",
                common::display_name(key.characteristic),
                Error::RequestFailedStatus(status)
            );
            self.observer.on_read_failed(characteristic, status);
            return;
        }

        let reading = codec::decode(key.characteristic, &value);
        self.values.insert(key, value);
        self.observer.on_characteristic_value(characteristic, reading);
    }

    fn on_characteristic_changed(&mut self, key: CharacteristicKey, value: Vec<u8>) {
        let Some(characteristic) = find_characteristic(&self.services, &key) else {
            log::debug!("Notification for unknown characteristic {}", key.characteristic);
            return;
        };

        let reading = codec::decode(key.characteristic, &value);
        self.values.insert(key, value);
        self.observer.on_characteristic_value(characteristic, reading);
        self.observer.on_notification(characteristic);
    }

    fn on_characteristic_written(&mut self, key: CharacteristicKey, status: GattStatus) {
        let device = self.current_device_name();
        let Some(characteristic) = find_characteristic(&self.services, &key) else {
            log::debug!("Write completion for unknown characteristic {}", key.characteristic);
            return;
        };

        let description = format!(
            "Device: {} Service: {} Characteristic: {}",
            device,
            common::display_name(key.service),
            common::display_name(key.characteristic)
        );

        if status.is_success() {
            self.observer.on_write_succeeded(characteristic, &description);
        } else {
            let description = format!("{} STATUS = {}", description, status);
            log::warn!("Write failed: {}", description);
            self.observer.on_write_failed(characteristic, &description);
        }
    }

    fn on_descriptor_written(
        &mut self,
        key: CharacteristicKey,
        descriptor: Uuid,
        status: GattStatus,
    ) {
        if status.is_success() {
            log::debug!(
                "Descriptor {} of {} written",
                common::display_name(descriptor),
                common::display_name(key.characteristic)
            );
            return;
        }

        log::warn!(
            "Writing descriptor {} of {} failed: {}",
            common::display_name(descriptor),
            common::display_name(key.characteristic),
            Error::RequestFailedStatus(status)
        );
        if let Some(characteristic) = find_characteristic(&self.services, &key) {
            self.observer
                .on_descriptor_write_failed(characteristic, descriptor, status);
        }
    }

    fn on_rssi_read(&mut self, status: GattStatus, rssi: i16) {
        if !status.is_success() {
            log::debug!("RSSI read failed: {}", Error::RequestFailedStatus(status));
            return;
        }

        self.observer.on_rssi_updated(rssi);
    }

    fn on_rssi_tick(&mut self) {
        self.rssi_tick_pending = false;

        let handle = match &self.connection {
            Some(handle) if self.connected && self.rssi_polling => handle.clone(),
            _ => {
                log::debug!("RSSI polling stopped");
                self.rssi_polling = false;
                return;
            }
        };

        self.transport.read_rssi(&handle);
        self.arm_rssi_timer();
    }
}
