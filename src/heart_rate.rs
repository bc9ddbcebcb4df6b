//! Heart Rate Measurement (0x2A37) decoding and zone mapping.
//!
//! Layout:
//! ```text
//! Byte 0: Flags
//!         Bit 0   = rate format (0 = u8, 1 = u16 little-endian)
//!         Bit 1-2 = sensor contact status
//!         Bit 3   = energy expended present
//!         Bit 4   = RR intervals present
//! Byte 1..: Rate (1 or 2 bytes)
//!           Energy expended (u16 LE, kJ) if flagged
//!           RR intervals (u16 LE each, 1/1024 s) if flagged
//! ```
//!
//! Only the rate is mandatory.  A payload too short for its declared
//! rate format is rejected; truncated optional fields are dropped.

use crate::config::{ZONE_HIGH_ABOVE_BPM, ZONE_MID_FROM_BPM};
use crate::error::DecodeError;
use heapless::Vec;
use smart_leds::RGB8;

const FLAG_RATE_U16: u8 = 0x01;
const FLAG_CONTACT_SUPPORTED: u8 = 0x04;
const FLAG_CONTACT_DETECTED: u8 = 0x02;
const FLAG_ENERGY_PRESENT: u8 = 0x08;
const FLAG_RR_PRESENT: u8 = 0x10;

/// RR intervals that fit in a 20-byte notification after flags + u8 rate.
pub const MAX_RR_INTERVALS: usize = 9;

/// Coarse intensity bucket driving the pulse color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Zone {
    /// Below 70 bpm - blue.
    Low,
    /// 70..=90 bpm - green.
    Mid,
    /// Above 90 bpm - red.
    High,
}

impl Zone {
    pub fn from_bpm(bpm: u16) -> Self {
        if bpm > ZONE_HIGH_ABOVE_BPM {
            Zone::High
        } else if bpm >= ZONE_MID_FROM_BPM {
            Zone::Mid
        } else {
            Zone::Low
        }
    }

    pub const fn color(self) -> RGB8 {
        match self {
            Zone::Low => RGB8 { r: 0, g: 0, b: 255 },
            Zone::Mid => RGB8 { r: 0, g: 255, b: 0 },
            Zone::High => RGB8 { r: 255, g: 0, b: 0 },
        }
    }
}

/// The latest reading, as consumed by the beat scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeartRateSample {
    pub bpm: u16,
    pub zone: Zone,
}

impl HeartRateSample {
    pub fn new(bpm: u16) -> Self {
        Self {
            bpm,
            zone: Zone::from_bpm(bpm),
        }
    }
}

/// Sensor skin-contact status (flags bits 1-2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorContact {
    NotSupported,
    NotDetected,
    Detected,
}

/// A fully parsed Heart Rate Measurement notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartRateMeasurement {
    /// Heart rate in beats per minute.
    pub bpm: u16,
    pub contact: SensorContact,
    /// Cumulative energy expended (kJ), if the sensor reports it.
    pub energy_expended: Option<u16>,
    /// Beat-to-beat intervals in 1/1024 s units, oldest first.
    pub rr_intervals: Vec<u16, MAX_RR_INTERVALS>,
}

impl HeartRateMeasurement {
    /// Parse a raw notification payload.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let (&flags, rest) = data.split_first().ok_or(DecodeError::Empty)?;

        let rate_len = if flags & FLAG_RATE_U16 != 0 { 2 } else { 1 };
        if rest.len() < rate_len {
            return Err(DecodeError::Truncated {
                needed: 1 + rate_len,
                got: data.len(),
            });
        }
        let bpm = if rate_len == 2 {
            u16::from_le_bytes([rest[0], rest[1]])
        } else {
            u16::from(rest[0])
        };
        let mut rest = &rest[rate_len..];

        let contact = match (
            flags & FLAG_CONTACT_SUPPORTED != 0,
            flags & FLAG_CONTACT_DETECTED != 0,
        ) {
            (false, _) => SensorContact::NotSupported,
            (true, false) => SensorContact::NotDetected,
            (true, true) => SensorContact::Detected,
        };

        let mut energy_expended = None;
        if flags & FLAG_ENERGY_PRESENT != 0 {
            if let Some((value, tail)) = take_u16(rest) {
                energy_expended = Some(value);
                rest = tail;
            } else {
                rest = &[];
            }
        }

        let mut rr_intervals = Vec::new();
        if flags & FLAG_RR_PRESENT != 0 {
            for chunk in rest.chunks_exact(2) {
                if rr_intervals
                    .push(u16::from_le_bytes([chunk[0], chunk[1]]))
                    .is_err()
                {
                    break;
                }
            }
        }

        Ok(Self {
            bpm,
            contact,
            energy_expended,
            rr_intervals,
        })
    }

    pub fn sample(&self) -> HeartRateSample {
        HeartRateSample::new(self.bpm)
    }
}

fn take_u16(data: &[u8]) -> Option<(u16, &[u8])> {
    match data {
        [lo, hi, tail @ ..] => Some((u16::from_le_bytes([*lo, *hi]), tail)),
        _ => None,
    }
}

/// Decode a notification straight to the sample the scheduler needs.
pub fn decode(data: &[u8]) -> Result<HeartRateSample, DecodeError> {
    HeartRateMeasurement::parse(data).map(|m| m.sample())
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
