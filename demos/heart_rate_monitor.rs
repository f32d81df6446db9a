//! This example scans for the first device advertising the heart rate service,
//! connects to it, subscribes to heart rate measurements and prints each value
//! together with a short text plot and the latest RSSI.

use std::sync::Arc;
use std::time::Duration;

use blesession::common::characteristics::HEART_RATE_MEASUREMENT;
use blesession::common::services::HEART_RATE;
use blesession::waveform::Trace;
use blesession::{
    event_channel, spawn_dispatcher, BtleplugTransport, Characteristic, CharacteristicKey,
    DeviceAddress, DiscoveredDevice, Error, Reading, Service, Session, SessionConfig,
    SessionObserver, TransportConfig,
};
use tokio::sync::{mpsc, Mutex};

enum Progress {
    Found(DeviceAddress),
    Ready,
}

struct Monitor {
    progress: mpsc::UnboundedSender<Progress>,
    trace: Option<Trace>,
    rssi: i16,
}

impl SessionObserver for Monitor {
    fn on_device_found(&mut self, device: &DiscoveredDevice) {
        if device.advertisement.services.contains(&HEART_RATE) {
            println!(
                "Found {} ({})",
                device.local_name().unwrap_or("unknown"),
                device.address
            );
            self.progress.send(Progress::Found(device.address.clone())).ok();
        }
    }

    fn on_services_available(&mut self, services: &[Service]) {
        for service in services {
            println!("Service: {}", blesession::common::display_name(service.uuid()));
        }
        self.progress.send(Progress::Ready).ok();
    }

    fn on_characteristic_value(&mut self, characteristic: &Characteristic, reading: Reading) {
        let trace = self
            .trace
            .get_or_insert_with(|| Trace::for_characteristic(characteristic.uuid()).unwrap());
        trace.record(&reading);

        let bar = "#".repeat((reading.value() / 4) as usize);
        println!("{:>8} {:>4} dBm  {}", reading.display(), self.rssi, bar);
    }

    fn on_rssi_updated(&mut self, rssi: i16) {
        self.rssi = rssi;
    }

    fn on_disconnected(&mut self, address: &DeviceAddress) {
        println!("Disconnected from {}", address);
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let (progress_tx, mut progress) = mpsc::unbounded_channel();
    let monitor = Monitor {
        progress: progress_tx,
        trace: None,
        rssi: 0,
    };

    let (events, receiver) = event_channel();
    let transport = BtleplugTransport::new(TransportConfig::default(), events.clone()).await?;
    let session = Session::new(transport, monitor, SessionConfig::default(), events);
    session.initialize()?;

    let session = Arc::new(Mutex::new(session));
    spawn_dispatcher(session.clone(), receiver);

    session.lock().await.start_scan()?;

    // Take the first heart rate sensor
    let address = loop {
        match progress.recv().await {
            Some(Progress::Found(address)) => break address,
            Some(Progress::Ready) => continue,
            None => return Ok(()),
        }
    };
    session.lock().await.connect(address)?;

    while let Some(step) = progress.recv().await {
        if let Progress::Ready = step {
            break;
        }
    }

    let key = CharacteristicKey::new(HEART_RATE, HEART_RATE_MEASUREMENT);
    session.lock().await.set_notification(&key, true)?;

    tokio::time::sleep(Duration::from_secs(60)).await;

    let mut session = session.lock().await;
    session.set_notification(&key, false)?;
    session.close();

    Ok(())
}
