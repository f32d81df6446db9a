use crate::characteristic::CharacteristicKey;
use crate::Characteristic;
use btleplug::api::Service as BtleService;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub(crate) uuid: Uuid,
    pub(crate) characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: Uuid, characteristics: Vec<Characteristic>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid() == uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Looks a characteristic up across a service snapshot.
pub(crate) fn find_characteristic<'a>(
    services: &'a [Service],
    key: &CharacteristicKey,
) -> Option<&'a Characteristic> {
    services
        .iter()
        .filter(|service| service.uuid == key.service)
        .find_map(|service| service.characteristic(key.characteristic))
}

impl From<&BtleService> for Service {
    fn from(service: &BtleService) -> Self {
        Service {
            uuid: service.uuid,
            characteristics: service
                .characteristics
                .iter()
                .map(Characteristic::from)
                .collect::<Vec<_>>(),
        }
    }
}
