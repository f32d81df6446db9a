//! Bounded point series for live plots of heart rate and ECG readings.

use std::collections::VecDeque;
use std::ops::RangeInclusive;

use uuid::Uuid;

use crate::codec::{self, Reading};
use crate::common::{self, CharacteristicKind};

pub const ECG_WINDOW: usize = 600;
pub const HEART_RATE_WINDOW: usize = 40;
/// Samples plotted per ECG packet; a full packet is 20 bytes.
pub const ECG_SAMPLES_PER_PACKET: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    kind: CharacteristicKind,
    capacity: usize,
    y_range: RangeInclusive<i32>,
    next_x: u64,
    points: VecDeque<(u64, i32)>,
}

impl Trace {
    /// Trace suited to a characteristic, if it is one that gets plotted.
    pub fn for_characteristic(uuid: Uuid) -> Option<Self> {
        match common::characteristic_kind(uuid)? {
            CharacteristicKind::EcgWave => Some(Self::new(
                CharacteristicKind::EcgWave,
                ECG_WINDOW,
                -6000..=20000,
            )),
            CharacteristicKind::HeartRateMeasurement => Some(Self::new(
                CharacteristicKind::HeartRateMeasurement,
                HEART_RATE_WINDOW,
                0..=300,
            )),
            _ => None,
        }
    }

    fn new(kind: CharacteristicKind, capacity: usize, y_range: RangeInclusive<i32>) -> Self {
        Self {
            kind,
            capacity,
            y_range,
            next_x: 0,
            points: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends the points carried by a reading and returns how many were added.
    pub fn record(&mut self, reading: &Reading) -> usize {
        match self.kind {
            CharacteristicKind::EcgWave => {
                let samples = codec::ecg_samples(reading.raw());
                let count = samples.len().min(ECG_SAMPLES_PER_PACKET);
                for sample in samples.into_iter().take(count) {
                    self.push(i32::from(sample));
                }
                count
            }
            _ => {
                self.push(reading.value() as i32);
                1
            }
        }
    }

    /// Appends one point, evicting the oldest once the window is full.
    pub fn push(&mut self, y: i32) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back((self.next_x, y));
        self.next_x += 1;
    }

    pub fn points(&self) -> impl Iterator<Item = (u64, i32)> + '_ {
        self.points.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Suggested fixed y axis bounds.
    pub fn y_range(&self) -> &RangeInclusive<i32> {
        &self.y_range
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.next_x = 0;
    }
}
