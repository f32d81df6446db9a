//! Single-connection BLE GATT session.
//!
//! A [`Session`] owns one peripheral connection: it scans, connects (or
//! cheaply reconnects), discovers services, reads, writes and subscribes to
//! characteristics, and polls the signal strength while connected. Every
//! result is decoded by the [`codec`] and pushed to a [`SessionObserver`].
//!
//! The BLE stack is reached through the [`Transport`] trait; [`BtleplugTransport`]
//! implements it on top of btleplug. Transport completions come back as
//! [`SessionEvent`]s which [`dispatch`] feeds into the session one at a time.
//!
//! ## Usage
//!
//! Connect to a heart rate sensor and print its measurements:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blesession::common::characteristics::HEART_RATE_MEASUREMENT;
//! use blesession::common::services::HEART_RATE;
//! use blesession::{
//!     event_channel, spawn_dispatcher, BtleplugTransport, Characteristic, CharacteristicKey,
//!     Error, Reading, Session, SessionConfig, SessionObserver, TransportConfig,
//! };
//! use tokio::sync::Mutex;
//!
//! struct Printer;
//!
//! impl SessionObserver for Printer {
//!     fn on_characteristic_value(&mut self, _: &Characteristic, reading: Reading) {
//!         println!("{}", reading.display());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     pretty_env_logger::init();
//!
//!     let (events, receiver) = event_channel();
//!     let transport = BtleplugTransport::new(TransportConfig::default(), events.clone()).await?;
//!     let session = Session::new(transport, Printer, SessionConfig::default(), events);
//!     session.initialize()?;
//!
//!     let session = Arc::new(Mutex::new(session));
//!     spawn_dispatcher(session.clone(), receiver);
//!
//!     session.lock().await.start_scan()?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     session.lock().await.connect("C4:7C:8D:6A:2F:01")?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     let key = CharacteristicKey::new(HEART_RATE, HEART_RATE_MEASUREMENT);
//!     session.lock().await.set_notification(&key, true)?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     session.lock().await.close();
//!
//!     Ok(())
//! }
//!```

#![warn(clippy::all, future_incompatible, nonstandard_style, rust_2018_idioms)]

pub use btleplug::api::CharPropFlags;

pub use characteristic::{Characteristic, CharacteristicKey, Descriptor};
pub use codec::{FormatKind, Reading};
pub use device::{Advertisement, DeviceAddress, DiscoveredDevice};
pub use error::{Error, Result};
pub use event::{
    dispatch, event_channel, spawn_dispatcher, EventReceiver, EventSender, SessionEvent,
};
pub use observer::{NullObserver, SessionObserver};
pub use platform::{BtleplugTransport, TransportConfig};
pub use service::Service;
pub use session::{Session, SessionConfig, SessionState, RSSI_UPDATE_INTERVAL};
pub use transport::{ConnectionHandle, ConnectionId, GattStatus, Transport};

mod characteristic;
mod device;
mod error;
mod event;
mod observer;
mod platform;
mod service;
mod session;
mod transport;

pub mod codec;
pub mod common;
pub mod waveform;
