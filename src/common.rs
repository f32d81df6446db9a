//! Well-known GATT UUIDs and the semantic role each one plays.

use uuid::Uuid;

pub mod services {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const GENERIC_ACCESS: Uuid = uuid_from_u16(0x1800);
    pub const DEVICE_INFORMATION: Uuid = uuid_from_u16(0x180A);
    pub const HEART_RATE: Uuid = uuid_from_u16(0x180D);
    pub const BATTERY: Uuid = uuid_from_u16(0x180F);
    /// Vendor service carrying the raw ECG stream.
    pub const ECG: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
}

pub mod characteristics {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const APPEARANCE: Uuid = uuid_from_u16(0x2A01);
    pub const BATTERY_LEVEL: Uuid = uuid_from_u16(0x2A19);
    pub const MODEL_NUMBER_STRING: Uuid = uuid_from_u16(0x2A24);
    pub const FIRMWARE_REVISION_STRING: Uuid = uuid_from_u16(0x2A26);
    pub const MANUFACTURER_NAME_STRING: Uuid = uuid_from_u16(0x2A29);
    pub const HEART_RATE_MEASUREMENT: Uuid = uuid_from_u16(0x2A37);
    pub const BODY_SENSOR_LOCATION: Uuid = uuid_from_u16(0x2A38);
    /// Notify characteristic of the ECG service.
    pub const ECG_WAVE: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);
}

pub mod descriptors {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = uuid_from_u16(0x2902);

    pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
    pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
    pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    GenericAccess,
    DeviceInformation,
    HeartRate,
    Battery,
    Ecg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicKind {
    Appearance,
    ManufacturerName,
    ModelNumber,
    FirmwareRevision,
    HeartRateMeasurement,
    BodySensorLocation,
    BatteryLevel,
    EcgWave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    ClientCharacteristicConfiguration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Service(ServiceKind),
    Characteristic(CharacteristicKind),
    Descriptor(DescriptorKind),
}

const REGISTRY: &[(Uuid, Role, &str)] = &[
    (services::GENERIC_ACCESS, Role::Service(ServiceKind::GenericAccess), "Generic Access"),
    (
        services::DEVICE_INFORMATION,
        Role::Service(ServiceKind::DeviceInformation),
        "Device Information",
    ),
    (services::HEART_RATE, Role::Service(ServiceKind::HeartRate), "Heart Rate"),
    (services::BATTERY, Role::Service(ServiceKind::Battery), "Battery Service"),
    (services::ECG, Role::Service(ServiceKind::Ecg), "ECG Service"),
    (
        characteristics::APPEARANCE,
        Role::Characteristic(CharacteristicKind::Appearance),
        "Appearance",
    ),
    (
        characteristics::MANUFACTURER_NAME_STRING,
        Role::Characteristic(CharacteristicKind::ManufacturerName),
        "Manufacturer Name String",
    ),
    (
        characteristics::MODEL_NUMBER_STRING,
        Role::Characteristic(CharacteristicKind::ModelNumber),
        "Model Number String",
    ),
    (
        characteristics::FIRMWARE_REVISION_STRING,
        Role::Characteristic(CharacteristicKind::FirmwareRevision),
        "Firmware Revision String",
    ),
    (
        characteristics::HEART_RATE_MEASUREMENT,
        Role::Characteristic(CharacteristicKind::HeartRateMeasurement),
        "Heart Rate Measurement",
    ),
    (
        characteristics::BODY_SENSOR_LOCATION,
        Role::Characteristic(CharacteristicKind::BodySensorLocation),
        "Body Sensor Location",
    ),
    (
        characteristics::BATTERY_LEVEL,
        Role::Characteristic(CharacteristicKind::BatteryLevel),
        "Battery Level",
    ),
    (characteristics::ECG_WAVE, Role::Characteristic(CharacteristicKind::EcgWave), "ECG Wave"),
    (
        descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION,
        Role::Descriptor(DescriptorKind::ClientCharacteristicConfiguration),
        "Client Characteristic Configuration",
    ),
];

/// Role of a well-known UUID.
pub fn role(uuid: Uuid) -> Option<Role> {
    REGISTRY
        .iter()
        .find(|(known, _, _)| *known == uuid)
        .map(|(_, role, _)| *role)
}

/// Human-readable name of a well-known UUID.
pub fn name(uuid: Uuid) -> Option<&'static str> {
    REGISTRY
        .iter()
        .find(|(known, _, _)| *known == uuid)
        .map(|(_, _, name)| *name)
}

/// Name of a UUID, falling back to its string form.
pub fn display_name(uuid: Uuid) -> String {
    name(uuid)
        .map(str::to_owned)
        .unwrap_or_else(|| uuid.to_string())
}

pub fn characteristic_kind(uuid: Uuid) -> Option<CharacteristicKind> {
    match role(uuid) {
        Some(Role::Characteristic(kind)) => Some(kind),
        _ => None,
    }
}

/// GAP appearance category names.
pub fn appearance_name(value: u16) -> &'static str {
    match value {
        0 => "Unknown",
        64 => "Generic Phone",
        128 => "Generic Computer",
        192 => "Generic Watch",
        193 => "Watch: Sports Watch",
        256 => "Generic Clock",
        320 => "Generic Display",
        384 => "Generic Remote Control",
        448 => "Generic Eye-glasses",
        512 => "Generic Tag",
        576 => "Generic Keyring",
        640 => "Generic Media Player",
        704 => "Generic Barcode Scanner",
        768 => "Generic Thermometer",
        769 => "Thermometer: Ear",
        832 => "Generic Heart rate Sensor",
        833 => "Heart Rate Sensor: Heart Rate Belt",
        896 => "Generic Blood Pressure",
        897 => "Blood Pressure: Arm",
        898 => "Blood Pressure: Wrist",
        960 => "Human Interface Device (HID)",
        961 => "Keyboard",
        962 => "Mouse",
        963 => "Joystick",
        964 => "Gamepad",
        965 => "Digitizer Tablet",
        966 => "Card Reader",
        967 => "Digital Pen",
        968 => "Barcode Scanner",
        1024 => "Generic Glucose Meter",
        1088 => "Generic: Running Walking Sensor",
        1089 => "Running Walking Sensor: In-Shoe",
        1090 => "Running Walking Sensor: On-Shoe",
        1091 => "Running Walking Sensor: On-Hip",
        1152 => "Generic: Cycling",
        1153 => "Cycling: Cycling Computer",
        1154 => "Cycling: Speed Sensor",
        1155 => "Cycling: Cadence Sensor",
        1156 => "Cycling: Power Sensor",
        1157 => "Cycling: Speed and Cadence Sensor",
        3136 => "Generic: Pulse Oximeter",
        3137 => "Fingertip",
        3138 => "Wrist Worn",
        3200 => "Generic: Weight Scale",
        5184 => "Generic: Outdoor Sports Activity",
        5185 => "Location Display Device",
        5186 => "Location and Navigation Display Device",
        5187 => "Location Pod",
        5188 => "Location and Navigation Pod",
        _ => "Unknown appearance",
    }
}

/// Heart-rate body sensor location names.
pub fn body_sensor_location_name(value: u8) -> &'static str {
    match value {
        0 => "Other",
        1 => "Chest",
        2 => "Wrist",
        3 => "Finger",
        4 => "Hand",
        5 => "Ear Lobe",
        6 => "Foot",
        _ => "Reserved value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_roles_and_names() {
        assert_eq!(
            role(characteristics::HEART_RATE_MEASUREMENT),
            Some(Role::Characteristic(CharacteristicKind::HeartRateMeasurement))
        );
        assert_eq!(name(services::BATTERY), Some("Battery Service"));
        assert_eq!(
            characteristic_kind(descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION),
            None
        );
        assert_eq!(
            characteristics::BATTERY_LEVEL.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn unknown_uuid_displays_as_string() {
        let uuid = Uuid::from_u128(0x1234);
        assert_eq!(role(uuid), None);
        assert_eq!(display_name(uuid), uuid.to_string());
    }
}
