use uuid::Uuid;

use crate::device::DeviceAddress;
use crate::session::SessionState;
use crate::transport::{ConnectionId, GattStatus};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Bluetooth LE hardware is not available")]
    HardwareUnavailable,

    #[error("Bluetooth radio is disabled")]
    RadioDisabled,

    #[error("invalid device address: {0}")]
    InvalidAddress(String),

    #[error("request failed with status {0}")]
    RequestFailedStatus(GattStatus),

    /// Raised inside the codec only; callers see a placeholder string instead.
    #[error("byte {0:#04x} cannot be rendered as text")]
    DecodeFallback(u8),

    /// Raised inside the session only; stale events are dropped.
    #[error("stale callback from connection {0}")]
    StaleCallback(ConnectionId),

    #[error("no live connection")]
    NotConnected,

    #[error("reconnect to {0} was rejected by the transport")]
    ReconnectRejected(DeviceAddress),

    #[error("service {0} is not part of the discovered services")]
    UnknownService(Uuid),

    #[error("characteristic {0} is not part of the discovered services")]
    UnknownCharacteristic(Uuid),

    #[error("notification toggle for {0} was rejected by the transport")]
    NotificationRejected(Uuid),

    #[error("operation not allowed in state {0:?}")]
    InvalidState(SessionState),

    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
