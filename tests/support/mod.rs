#![allow(dead_code)]

use blesession::common::{characteristics, descriptors, services};
use blesession::{
    event_channel, CharPropFlags, Characteristic, CharacteristicKey, ConnectionHandle,
    ConnectionId, Descriptor, DeviceAddress, DiscoveredDevice, Error, EventReceiver, GattStatus,
    Reading, Result, Service, Session, SessionConfig, SessionEvent, SessionObserver, Transport,
};
use uuid::Uuid;

pub const ADDRESS: &str = "C4:7C:8D:6A:2F:01";
pub const OTHER_ADDRESS: &str = "00:22:D0:11:8E:5A";

const NO_DESCRIPTORS: [Uuid; 0] = [];

pub const CUSTOM_SERVICE: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);
pub const CUSTOM_CONTROL: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);
pub const CUSTOM_ALERT: Uuid = Uuid::from_u128(0x0000fff2_0000_1000_8000_00805f9b34fb);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(String),
    Reconnect(ConnectionId),
    Disconnect(ConnectionId),
    Close(ConnectionId),
    DiscoverServices(ConnectionId),
    Read(CharacteristicKey),
    Write(CharacteristicKey, Vec<u8>),
    SetNotification(CharacteristicKey, bool),
    WriteDescriptor(Uuid, Vec<u8>),
    ReadRssi(ConnectionId),
}

/// Transport that records every request and completes none of them.
pub struct MockTransport {
    pub calls: Vec<Call>,
    pub hardware: bool,
    pub radio: bool,
    pub accept_notifications: bool,
    next_id: u64,
    open: Vec<ConnectionId>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            hardware: true,
            radio: true,
            accept_notifications: true,
            next_id: 0,
            open: Vec::new(),
        }
    }
}

impl MockTransport {
    pub fn with_hardware(mut self, available: bool) -> Self {
        self.hardware = available;
        self
    }

    pub fn with_radio(mut self, enabled: bool) -> Self {
        self.radio = enabled;
        self
    }

    /// Every local notification toggle fails.
    pub fn rejecting_notifications(mut self) -> Self {
        self.accept_notifications = false;
        self
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn rssi_reads(&self) -> usize {
        self.count(|call| matches!(call, Call::ReadRssi(_)))
    }
}

fn is_valid_address(address: &str) -> bool {
    let parts = address.split(':').collect::<Vec<_>>();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

impl Transport for MockTransport {
    fn check_hardware_available(&self) -> bool {
        self.hardware
    }

    fn is_radio_enabled(&self) -> bool {
        self.radio
    }

    fn start_scan(&mut self) -> Result<()> {
        self.calls.push(Call::StartScan);
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.calls.push(Call::StopScan);
    }

    fn connect(&mut self, address: &DeviceAddress) -> Result<ConnectionHandle> {
        if !is_valid_address(address.as_str()) {
            return Err(Error::InvalidAddress(address.to_string()));
        }

        self.calls.push(Call::Connect(address.to_string()));
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.open.push(id);

        Ok(ConnectionHandle {
            id,
            address: address.clone(),
        })
    }

    fn reconnect(&mut self, handle: &ConnectionHandle) -> bool {
        self.calls.push(Call::Reconnect(handle.id));
        self.open.contains(&handle.id)
    }

    fn disconnect(&mut self, handle: &ConnectionHandle) {
        self.calls.push(Call::Disconnect(handle.id));
    }

    fn close(&mut self, handle: &ConnectionHandle) {
        self.calls.push(Call::Close(handle.id));
        self.open.retain(|id| *id != handle.id);
    }

    fn discover_services(&mut self, handle: &ConnectionHandle) {
        self.calls.push(Call::DiscoverServices(handle.id));
    }

    fn read_characteristic(&mut self, _: &ConnectionHandle, characteristic: &Characteristic) {
        self.calls.push(Call::Read(characteristic.key()));
    }

    fn write_characteristic(
        &mut self,
        _: &ConnectionHandle,
        characteristic: &Characteristic,
        value: &[u8],
    ) {
        self.calls
            .push(Call::Write(characteristic.key(), value.to_vec()));
    }

    fn set_notification(
        &mut self,
        _: &ConnectionHandle,
        characteristic: &Characteristic,
        enabled: bool,
    ) -> bool {
        self.calls
            .push(Call::SetNotification(characteristic.key(), enabled));
        self.accept_notifications
    }

    fn write_descriptor(&mut self, _: &ConnectionHandle, descriptor: &Descriptor, value: &[u8]) {
        self.calls
            .push(Call::WriteDescriptor(descriptor.uuid, value.to_vec()));
    }

    fn read_rssi(&mut self, handle: &ConnectionHandle) {
        self.calls.push(Call::ReadRssi(handle.id));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    DeviceFound(String),
    Connected(String),
    Disconnected(String),
    Services(Vec<Uuid>),
    Characteristics(Uuid, Vec<Uuid>),
    Value {
        uuid: Uuid,
        display: String,
        value: u32,
        raw: Vec<u8>,
    },
    Notification(Uuid),
    ReadFailed(Uuid, GattStatus),
    WriteSucceeded(Uuid, String),
    WriteFailed(Uuid, String),
    DescriptorWriteFailed(Uuid, GattStatus),
    Rssi(i16),
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub seen: Vec<Observed>,
}

impl RecordingObserver {
    pub fn count(&self, predicate: impl Fn(&Observed) -> bool) -> usize {
        self.seen.iter().filter(|seen| predicate(seen)).count()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_device_found(&mut self, device: &DiscoveredDevice) {
        self.seen
            .push(Observed::DeviceFound(device.address.to_string()));
    }

    fn on_connected(&mut self, address: &DeviceAddress) {
        self.seen.push(Observed::Connected(address.to_string()));
    }

    fn on_disconnected(&mut self, address: &DeviceAddress) {
        self.seen.push(Observed::Disconnected(address.to_string()));
    }

    fn on_services_available(&mut self, services: &[Service]) {
        self.seen.push(Observed::Services(
            services.iter().map(Service::uuid).collect(),
        ));
    }

    fn on_characteristics_for_service(
        &mut self,
        service: &Service,
        characteristics: &[Characteristic],
    ) {
        self.seen.push(Observed::Characteristics(
            service.uuid(),
            characteristics.iter().map(Characteristic::uuid).collect(),
        ));
    }

    fn on_characteristic_value(&mut self, characteristic: &Characteristic, reading: Reading) {
        self.seen.push(Observed::Value {
            uuid: characteristic.uuid(),
            display: reading.display().to_owned(),
            value: reading.value(),
            raw: reading.raw().to_vec(),
        });
    }

    fn on_notification(&mut self, characteristic: &Characteristic) {
        self.seen
            .push(Observed::Notification(characteristic.uuid()));
    }

    fn on_read_failed(&mut self, characteristic: &Characteristic, status: GattStatus) {
        self.seen
            .push(Observed::ReadFailed(characteristic.uuid(), status));
    }

    fn on_write_succeeded(&mut self, characteristic: &Characteristic, description: &str) {
        self.seen.push(Observed::WriteSucceeded(
            characteristic.uuid(),
            description.to_owned(),
        ));
    }

    fn on_write_failed(&mut self, characteristic: &Characteristic, description: &str) {
        self.seen.push(Observed::WriteFailed(
            characteristic.uuid(),
            description.to_owned(),
        ));
    }

    fn on_descriptor_write_failed(
        &mut self,
        characteristic: &Characteristic,
        _: Uuid,
        status: GattStatus,
    ) {
        self.seen
            .push(Observed::DescriptorWriteFailed(characteristic.uuid(), status));
    }

    fn on_rssi_updated(&mut self, rssi: i16) {
        self.seen.push(Observed::Rssi(rssi));
    }
}

pub type TestSession = Session<MockTransport, RecordingObserver>;

pub fn heart_rate_service() -> Service {
    Service::new(
        services::HEART_RATE,
        vec![
            Characteristic::new(
                services::HEART_RATE,
                characteristics::HEART_RATE_MEASUREMENT,
                CharPropFlags::NOTIFY,
                [descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION],
            ),
            Characteristic::new(
                services::HEART_RATE,
                characteristics::BODY_SENSOR_LOCATION,
                CharPropFlags::READ,
                NO_DESCRIPTORS,
            ),
        ],
    )
}

pub fn battery_service() -> Service {
    Service::new(
        services::BATTERY,
        vec![Characteristic::new(
            services::BATTERY,
            characteristics::BATTERY_LEVEL,
            CharPropFlags::READ | CharPropFlags::NOTIFY,
            NO_DESCRIPTORS,
        )],
    )
}

pub fn custom_service() -> Service {
    Service::new(
        CUSTOM_SERVICE,
        vec![
            Characteristic::new(
                CUSTOM_SERVICE,
                CUSTOM_CONTROL,
                CharPropFlags::READ | CharPropFlags::WRITE,
                NO_DESCRIPTORS,
            ),
            Characteristic::new(
                CUSTOM_SERVICE,
                CUSTOM_ALERT,
                CharPropFlags::INDICATE,
                [descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION],
            ),
        ],
    )
}

pub fn all_services() -> Vec<Service> {
    vec![heart_rate_service(), battery_service(), custom_service()]
}

pub fn heart_rate_key() -> CharacteristicKey {
    CharacteristicKey::new(services::HEART_RATE, characteristics::HEART_RATE_MEASUREMENT)
}

pub fn battery_key() -> CharacteristicKey {
    CharacteristicKey::new(services::BATTERY, characteristics::BATTERY_LEVEL)
}

pub fn control_key() -> CharacteristicKey {
    CharacteristicKey::new(CUSTOM_SERVICE, CUSTOM_CONTROL)
}

pub fn alert_key() -> CharacteristicKey {
    CharacteristicKey::new(CUSTOM_SERVICE, CUSTOM_ALERT)
}

pub fn new_session_with(config: SessionConfig) -> (TestSession, EventReceiver) {
    let (events, receiver) = event_channel();
    let session = Session::new(
        MockTransport::default(),
        RecordingObserver::default(),
        config,
        events,
    );
    (session, receiver)
}

pub fn new_session() -> (TestSession, EventReceiver) {
    new_session_with(SessionConfig::default())
}

pub fn connection_id(session: &TestSession) -> ConnectionId {
    session
        .connection()
        .map(|handle| handle.id)
        .expect("session has no connection")
}

pub fn connected_event(connection: ConnectionId, connected: bool) -> SessionEvent {
    SessionEvent::ConnectionStateChanged {
        connection,
        connected,
    }
}

/// Connects to [`ADDRESS`] and completes service discovery.
pub fn ready_session() -> (TestSession, EventReceiver, ConnectionId) {
    let (mut session, receiver) = new_session();
    session.connect(ADDRESS).expect("connect");

    let connection = connection_id(&session);
    session.handle_event(connected_event(connection, true));
    session.handle_event(SessionEvent::ServicesDiscovered {
        connection,
        status: GattStatus::SUCCESS,
        services: all_services(),
    });

    (session, receiver, connection)
}
