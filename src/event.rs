//! Events flowing from the transport (and the RSSI timer) into the session.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::characteristic::CharacteristicKey;
use crate::device::DiscoveredDevice;
use crate::transport::{ConnectionId, GattStatus, Transport};
use crate::{Service, Session, SessionObserver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Scan result, forwarded verbatim while scanning.
    DeviceFound(DiscoveredDevice),
    ConnectionStateChanged {
        connection: ConnectionId,
        connected: bool,
    },
    ServicesDiscovered {
        connection: ConnectionId,
        status: GattStatus,
        services: Vec<Service>,
    },
    CharacteristicRead {
        connection: ConnectionId,
        key: CharacteristicKey,
        status: GattStatus,
        value: Vec<u8>,
    },
    /// Unsolicited value pushed by the peripheral.
    CharacteristicChanged {
        connection: ConnectionId,
        key: CharacteristicKey,
        value: Vec<u8>,
    },
    CharacteristicWritten {
        connection: ConnectionId,
        key: CharacteristicKey,
        status: GattStatus,
    },
    DescriptorWritten {
        connection: ConnectionId,
        key: CharacteristicKey,
        descriptor: Uuid,
        status: GattStatus,
    },
    RssiRead {
        connection: ConnectionId,
        status: GattStatus,
        rssi: i16,
    },
    /// Firing of the RSSI polling timer.
    RssiTick,
}

impl SessionEvent {
    /// The connection this event belongs to, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            SessionEvent::DeviceFound(_) | SessionEvent::RssiTick => None,
            SessionEvent::ConnectionStateChanged { connection, .. }
            | SessionEvent::ServicesDiscovered { connection, .. }
            | SessionEvent::CharacteristicRead { connection, .. }
            | SessionEvent::CharacteristicChanged { connection, .. }
            | SessionEvent::CharacteristicWritten { connection, .. }
            | SessionEvent::DescriptorWritten { connection, .. }
            | SessionEvent::RssiRead { connection, .. } => Some(*connection),
        }
    }
}

pub type EventSender = UnboundedSender<SessionEvent>;
pub type EventReceiver = UnboundedReceiver<SessionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Feeds events into the session one at a time.
///
/// Runs until every sender is dropped, including the one the session keeps
/// for its RSSI timer.
pub async fn dispatch<T, O>(session: Arc<Mutex<Session<T, O>>>, events: EventReceiver)
where
    T: Transport,
    O: SessionObserver,
{
    let mut events = UnboundedReceiverStream::new(events);

    while let Some(event) = events.next().await {
        session.lock().await.handle_event(event);
    }

    log::info!("Event channel closed, dispatcher stopped.");
}

pub fn spawn_dispatcher<T, O>(
    session: Arc<Mutex<Session<T, O>>>,
    events: EventReceiver,
) -> JoinHandle<()>
where
    T: Transport + 'static,
    O: SessionObserver + 'static,
{
    tokio::spawn(dispatch(session, events))
}
