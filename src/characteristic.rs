use btleplug::api::{
    CharPropFlags, Characteristic as BtleCharacteristic, Descriptor as BtleDescriptor,
};
use uuid::Uuid;

/// Identifies a characteristic within a device's service snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicKey {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicKey {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub characteristic: CharacteristicKey,
}

/// A characteristic as found by service discovery.
///
/// Holds no value: raw buffers are owned by the session and handed out as
/// [`Reading`](crate::codec::Reading)s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub(crate) key: CharacteristicKey,
    pub(crate) properties: CharPropFlags,
    pub(crate) descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn new(
        service: Uuid,
        uuid: Uuid,
        properties: CharPropFlags,
        descriptors: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        let key = CharacteristicKey::new(service, uuid);
        Self {
            key,
            properties,
            descriptors: descriptors
                .into_iter()
                .map(|uuid| Descriptor {
                    uuid,
                    characteristic: key,
                })
                .collect(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.key.characteristic
    }

    pub fn service_uuid(&self) -> Uuid {
        self.key.service
    }

    pub fn key(&self) -> CharacteristicKey {
        self.key
    }

    pub fn properties(&self) -> CharPropFlags {
        self.properties
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }

    #[inline]
    pub fn can_read(&self) -> bool {
        self.properties.contains(CharPropFlags::READ)
    }

    #[inline]
    pub fn can_write(&self) -> bool {
        self.properties
            .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
    }

    #[inline]
    pub fn can_notify(&self) -> bool {
        self.properties
            .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
    }
}

impl From<&BtleCharacteristic> for Characteristic {
    fn from(characteristic: &BtleCharacteristic) -> Self {
        Characteristic::new(
            characteristic.service_uuid,
            characteristic.uuid,
            characteristic.properties,
            characteristic.descriptors.iter().map(|d: &BtleDescriptor| d.uuid),
        )
    }
}
