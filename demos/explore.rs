//! This example connects to the device given on the command line, lists its
//! services and characteristics and reads every readable characteristic once.
//!
//! ```text
//! cargo run --example explore -- C4:7C:8D:6A:2F:01 [write-hex]
//! ```
//!
//! When a hex payload is given it is written to the first writable
//! characteristic that was found.

use std::sync::Arc;
use std::time::Duration;

use blesession::codec::{self, describe_properties, resolve_display_format};
use blesession::common::display_name;
use blesession::{
    event_channel, spawn_dispatcher, BtleplugTransport, Characteristic, DeviceAddress,
    DiscoveredDevice, Error, GattStatus, Reading, Service, Session, SessionConfig,
    SessionObserver, TransportConfig,
};
use tokio::sync::{mpsc, Mutex};

enum Update {
    Services(Vec<Service>),
    Done,
}

struct Explorer {
    updates: mpsc::UnboundedSender<Update>,
}

impl Explorer {
    fn done(&self) {
        self.updates.send(Update::Done).ok();
    }
}

impl SessionObserver for Explorer {
    fn on_device_found(&mut self, device: &DiscoveredDevice) {
        println!(
            "{} {:>4} dBm {}",
            device.address,
            device.rssi.unwrap_or(0),
            device.local_name().unwrap_or("")
        );
    }

    fn on_connected(&mut self, address: &DeviceAddress) {
        println!("Connected to {}", address);
    }

    fn on_services_available(&mut self, services: &[Service]) {
        self.updates.send(Update::Services(services.to_vec())).ok();
    }

    fn on_characteristic_value(&mut self, characteristic: &Characteristic, reading: Reading) {
        println!(
            "  {:<32} {:<28} [{}]",
            display_name(characteristic.uuid()),
            reading.display(),
            reading.hex()
        );
        self.done();
    }

    fn on_read_failed(&mut self, characteristic: &Characteristic, status: GattStatus) {
        println!(
            "  {:<32} read failed, status {}",
            display_name(characteristic.uuid()),
            status
        );
        self.done();
    }

    fn on_write_succeeded(&mut self, _: &Characteristic, description: &str) {
        println!("Written: {}", description);
        self.done();
    }

    fn on_write_failed(&mut self, _: &Characteristic, description: &str) {
        println!("Write failed: {}", description);
        self.done();
    }

    fn on_rssi_updated(&mut self, rssi: i16) {
        log::debug!("RSSI {} dBm", rssi);
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let address = match args.next() {
        Some(address) => address,
        None => {
            eprintln!("usage: explore <address> [write-hex]");
            return Ok(());
        }
    };
    let payload = args.next().map(|hex| codec::parse_hex(&hex));

    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let (events, receiver) = event_channel();
    let transport = BtleplugTransport::new(TransportConfig::default(), events.clone()).await?;
    let session = Session::new(
        transport,
        Explorer {
            updates: updates_tx,
        },
        SessionConfig::default(),
        events,
    );
    session.initialize()?;

    let session = Arc::new(Mutex::new(session));
    spawn_dispatcher(session.clone(), receiver);

    // The platform only connects to peripherals it has seen in a scan
    session.lock().await.start_scan()?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    session.lock().await.connect(address.as_str())?;

    let services = loop {
        match updates.recv().await {
            Some(Update::Services(services)) => break services,
            Some(Update::Done) => continue,
            None => return Ok(()),
        }
    };

    let mut writable = None;
    for service in &services {
        println!("{}", display_name(service.uuid()));

        for characteristic in service.characteristics() {
            let properties = characteristic.properties();
            println!(
                "  {:<32} {} {}",
                display_name(characteristic.uuid()),
                describe_properties(properties),
                resolve_display_format(properties).description()
            );

            if characteristic.can_write() && writable.is_none() {
                writable = Some(characteristic.key());
            }
        }
    }

    // One outstanding request at a time
    for characteristic in services.iter().flat_map(Service::characteristics) {
        if !characteristic.can_read() {
            continue;
        }

        session
            .lock()
            .await
            .read_characteristic(&characteristic.key())?;
        updates.recv().await;
    }

    if let (Some(key), Some(payload)) = (writable, payload) {
        session.lock().await.write_characteristic(&key, &payload)?;
        updates.recv().await;
    }

    session.lock().await.close();

    Ok(())
}
