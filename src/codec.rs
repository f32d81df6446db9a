//! Decoding of raw characteristic payloads into display values.
//!
//! Decoding is dispatched on the characteristic UUID rather than on the
//! declared format, which peripherals routinely get wrong. Every byte
//! sequence decodes to something: payloads that a specific decoder cannot
//! use fall through to the generic decoder, and the generic decoder degrades
//! to [`PLACEHOLDER`] instead of failing.

use std::time::Instant;

use btleplug::api::CharPropFlags;
use uuid::Uuid;

use crate::common::{self, CharacteristicKind};
use crate::Error;

/// Display string used when a payload cannot be rendered as text.
pub const PLACEHOLDER: &str = "-";

/// A decoded characteristic value. Produced fresh on every decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    value: u32,
    display: String,
    raw: Vec<u8>,
    captured_at: Instant,
}

impl Reading {
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Raw bytes rendered as `0x`-prefixed hex.
    pub fn hex(&self) -> String {
        hex_string(&self.raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    HeartRate,
    Text,
    Appearance,
    BodySensorLocation,
    BatteryLevel,
    Generic,
}

fn decoder_for(uuid: Uuid) -> Decoder {
    match common::characteristic_kind(uuid) {
        Some(CharacteristicKind::HeartRateMeasurement) => Decoder::HeartRate,
        Some(
            CharacteristicKind::ManufacturerName
            | CharacteristicKind::ModelNumber
            | CharacteristicKind::FirmwareRevision,
        ) => Decoder::Text,
        Some(CharacteristicKind::Appearance) => Decoder::Appearance,
        Some(CharacteristicKind::BodySensorLocation) => Decoder::BodySensorLocation,
        Some(CharacteristicKind::BatteryLevel) => Decoder::BatteryLevel,
        Some(CharacteristicKind::EcgWave) | None => Decoder::Generic,
    }
}

/// Decodes `raw` as a value of characteristic `uuid`, stamped with the current time.
pub fn decode(uuid: Uuid, raw: &[u8]) -> Reading {
    decode_at(uuid, raw, Instant::now())
}

pub fn decode_at(uuid: Uuid, raw: &[u8], captured_at: Instant) -> Reading {
    let (value, display) = match decoder_for(uuid) {
        Decoder::HeartRate => heart_rate(raw),
        Decoder::Text => (0, String::from_utf8_lossy(raw).into_owned()),
        Decoder::Appearance => appearance(raw),
        Decoder::BodySensorLocation => body_sensor_location(raw),
        Decoder::BatteryLevel => battery_level(raw),
        Decoder::Generic => generic(raw),
    };

    Reading {
        value,
        display,
        raw: raw.to_vec(),
        captured_at,
    }
}

/// Little-endian unsigned field of up to `width` bytes at `offset`.
/// Bytes beyond the end of the buffer read as zero.
fn le_field(raw: &[u8], offset: usize, width: usize) -> u32 {
    raw.iter()
        .skip(offset)
        .take(width.min(4))
        .enumerate()
        .fold(0, |acc, (i, &byte)| acc | u32::from(byte) << (8 * i))
}

fn heart_rate(raw: &[u8]) -> (u32, String) {
    let Some(&flags) = raw.first() else {
        return generic(raw);
    };

    // Flags bit 0 selects a uint16 field at offset 2 over a uint8 at offset 1.
    let bpm = if flags & 0x01 == 0 {
        le_field(raw, 1, 1)
    } else {
        le_field(raw, 2, 2)
    };

    (bpm, format!("{} bpm", bpm))
}

fn appearance(raw: &[u8]) -> (u32, String) {
    if raw.is_empty() {
        return generic(raw);
    }

    let value = le_field(raw, 0, 2);
    (value, common::appearance_name(value as u16).to_owned())
}

fn body_sensor_location(raw: &[u8]) -> (u32, String) {
    match raw.first() {
        Some(&location) => (
            u32::from(location),
            common::body_sensor_location_name(location).to_owned(),
        ),
        None => generic(raw),
    }
}

fn battery_level(raw: &[u8]) -> (u32, String) {
    match raw.first() {
        Some(&level) => (u32::from(level), format!("{}% battery level", level)),
        None => generic(raw),
    }
}

fn generic(raw: &[u8]) -> (u32, String) {
    let value = le_field(raw, 0, 4);
    let display = printable(raw).unwrap_or_else(|e| {
        log::trace!("Falling back to placeholder: {}", e);
        PLACEHOLDER.to_owned()
    });

    (value, display)
}

/// Best-effort text reconstruction of an unknown payload.
///
/// Every byte below 0x80 is kept as its ASCII character, control characters
/// included. A byte with the top bit set fails the whole reconstruction.
fn printable(raw: &[u8]) -> Result<String, Error> {
    raw.iter()
        .map(|&byte| {
            if byte.is_ascii() {
                Ok(char::from(byte))
            } else {
                Err(Error::DecodeFallback(byte))
            }
        })
        .collect()
}

/// Big-endian signed 16-bit samples of an ECG stream packet.
/// A trailing odd byte is ignored.
pub fn ecg_samples(raw: &[u8]) -> Vec<i16> {
    raw.chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Renders bytes as `0x` followed by uppercase hex pairs; empty input renders empty.
pub fn hex_string(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }

    raw.iter().fold(String::from("0x"), |mut out, byte| {
        out.push_str(&format!("{:02X}", byte));
        out
    })
}

/// Parses user-entered hex such as `"0x01ff"` into bytes.
///
/// An optional `0x` prefix is dropped, non-hex characters are ignored and a
/// trailing unpaired digit is discarded.
pub fn parse_hex(text: &str) -> Vec<u8> {
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    let digits = text
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect::<Vec<_>>();

    digits
        .chunks_exact(2)
        .map(|pair| pair[0] << 4 | pair[1])
        .collect()
}

/// Renders a property bitmask as `0x0012 [read notify]`.
pub fn describe_properties(properties: CharPropFlags) -> String {
    let names = [
        (CharPropFlags::READ, "read"),
        (CharPropFlags::WRITE, "write"),
        (CharPropFlags::NOTIFY, "notify"),
        (CharPropFlags::INDICATE, "indicate"),
        (CharPropFlags::WRITE_WITHOUT_RESPONSE, "write_no_response"),
    ]
    .iter()
    .filter(|(flag, _)| properties.contains(*flag))
    .map(|(_, name)| *name)
    .collect::<Vec<_>>();

    format!("0x{:04X} [{}]", properties.bits(), names.join(" "))
}

/// Value format label shown next to a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Float,
    ShortFloat,
    Signed16,
    Signed32,
    Signed8,
    Unsigned16,
    Unsigned32,
    Unsigned8,
    None,
}

impl FormatKind {
    /// Format code; the low nibble is the width in bytes.
    pub const fn code(self) -> u8 {
        match self {
            FormatKind::Float => 0x34,
            FormatKind::ShortFloat => 0x32,
            FormatKind::Signed16 => 0x22,
            FormatKind::Signed32 => 0x24,
            FormatKind::Signed8 => 0x21,
            FormatKind::Unsigned16 => 0x12,
            FormatKind::Unsigned32 => 0x14,
            FormatKind::Unsigned8 => 0x11,
            FormatKind::None => 0x00,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FormatKind::Float => "32bit float",
            FormatKind::ShortFloat => "16bit float",
            FormatKind::Signed16 => "16bit signed int",
            FormatKind::Signed32 => "32bit signed int",
            FormatKind::Signed8 => "8bit signed int",
            FormatKind::Unsigned16 => "16bit unsigned int",
            FormatKind::Unsigned32 => "32bit unsigned int",
            FormatKind::Unsigned8 => "8bit unsigned int",
            FormatKind::None => "Unknown format",
        }
    }
}

const FORMAT_PRIORITY: [FormatKind; 8] = [
    FormatKind::Float,
    FormatKind::ShortFloat,
    FormatKind::Signed16,
    FormatKind::Signed32,
    FormatKind::Signed8,
    FormatKind::Unsigned16,
    FormatKind::Unsigned32,
    FormatKind::Unsigned8,
];

/// Picks a format label from the property bitmask.
///
/// The first format whose code shares a bit with the mask wins. This is a
/// labelling heuristic only and has no influence on [`decode`].
pub fn resolve_display_format(properties: CharPropFlags) -> FormatKind {
    let bits = properties.bits();

    FORMAT_PRIORITY
        .iter()
        .copied()
        .find(|format| format.code() & bits != 0)
        .unwrap_or(FormatKind::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::characteristics::*;

    fn unknown() -> Uuid {
        Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb)
    }

    #[test]
    fn heart_rate_uint8() {
        let reading = decode(HEART_RATE_MEASUREMENT, &[0x00, 0x4B]);
        assert_eq!(reading.value(), 75);
        assert_eq!(reading.display(), "75 bpm");
    }

    #[test]
    fn heart_rate_uint16_reads_from_offset_two() {
        let reading = decode(HEART_RATE_MEASUREMENT, &[0x01, 0x00, 0x4B, 0x01]);
        assert_eq!(reading.value(), 0x014B);
        assert_eq!(reading.display(), "331 bpm");

        // Short payload: the 16-bit field at offset 2 holds only 0x00.
        let reading = decode(HEART_RATE_MEASUREMENT, &[0x01, 0x4B, 0x00]);
        assert_eq!(reading.value(), 0);
        assert_eq!(reading.display(), "0 bpm");
    }

    #[test]
    fn battery_level() {
        let reading = decode(BATTERY_LEVEL, &[0x64]);
        assert_eq!(reading.value(), 100);
        assert_eq!(reading.display(), "100% battery level");
    }

    #[test]
    fn strings_are_taken_verbatim() {
        let reading = decode(MANUFACTURER_NAME_STRING, b"Polar Electro Oy");
        assert_eq!(reading.display(), "Polar Electro Oy");
        assert_eq!(reading.value(), 0);

        let reading = decode(FIRMWARE_REVISION_STRING, b"1.4.0");
        assert_eq!(reading.display(), "1.4.0");
    }

    #[test]
    fn appearance_resolves_name() {
        let reading = decode(APPEARANCE, &[0x41, 0x03]);
        assert_eq!(reading.value(), 833);
        assert_eq!(reading.display(), "Heart Rate Sensor: Heart Rate Belt");
    }

    #[test]
    fn body_sensor_location_resolves_name() {
        assert_eq!(decode(BODY_SENSOR_LOCATION, &[0x01]).display(), "Chest");
        assert_eq!(decode(BODY_SENSOR_LOCATION, &[0x09]).display(), "Reserved value");
    }

    #[test]
    fn generic_little_endian_value() {
        let reading = decode(unknown(), &[0x01, 0x02]);
        assert_eq!(reading.value(), 0x0201);

        let reading = decode(unknown(), &[0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(reading.value(), 0x0403_0201);
    }

    #[test]
    fn generic_text_falls_back_to_placeholder() {
        assert_eq!(decode(unknown(), b"OK").display(), "OK");
        assert_eq!(decode(unknown(), &[0x41, 0x80]).display(), PLACEHOLDER);
        assert_eq!(decode(unknown(), &[]).display(), "");
    }

    #[test]
    fn decode_is_total() {
        let uuids = [
            HEART_RATE_MEASUREMENT,
            BATTERY_LEVEL,
            APPEARANCE,
            BODY_SENSOR_LOCATION,
            MODEL_NUMBER_STRING,
            ECG_WAVE,
            unknown(),
        ];
        let payloads: [&[u8]; 5] = [&[], &[0xFF], &[0x01], &[0xFF; 3], &[0x80; 32]];

        for uuid in uuids {
            for raw in payloads {
                let reading = decode(uuid, raw);
                assert_eq!(reading.raw(), raw);
            }
        }
    }

    #[test]
    fn empty_payloads_use_generic_decoder() {
        let reading = decode(BATTERY_LEVEL, &[]);
        assert_eq!(reading.value(), 0);
        assert_eq!(reading.display(), "");
    }

    #[test]
    fn decode_is_deterministic() {
        let now = Instant::now();
        let raw = [0x16, 0x48, 0x02, 0x90];
        assert_eq!(
            decode_at(HEART_RATE_MEASUREMENT, &raw, now),
            decode_at(HEART_RATE_MEASUREMENT, &raw, now)
        );
    }

    #[test]
    fn ecg_samples_are_big_endian() {
        assert_eq!(ecg_samples(&[0x01, 0x00, 0xFF, 0xFE, 0x7F]), vec![256, -2]);
    }

    #[test]
    fn hex_helpers() {
        assert_eq!(hex_string(&[0x0A, 0xFF]), "0x0AFF");
        assert_eq!(hex_string(&[]), "");
        assert_eq!(parse_hex("0x0aff"), vec![0x0A, 0xFF]);
        assert_eq!(parse_hex("01 02 3"), vec![0x01, 0x02]);
    }

    #[test]
    fn properties_description() {
        let props = CharPropFlags::READ | CharPropFlags::NOTIFY;
        assert_eq!(describe_properties(props), "0x0012 [read notify]");
    }

    #[test]
    fn display_format_priority() {
        assert_eq!(
            resolve_display_format(CharPropFlags::READ | CharPropFlags::NOTIFY),
            FormatKind::Float
        );
        assert_eq!(resolve_display_format(CharPropFlags::READ), FormatKind::ShortFloat);
        assert_eq!(resolve_display_format(CharPropFlags::BROADCAST), FormatKind::Signed8);
        assert_eq!(resolve_display_format(CharPropFlags::WRITE), FormatKind::None);
        assert_eq!(resolve_display_format(CharPropFlags::empty()), FormatKind::None);
    }
}
