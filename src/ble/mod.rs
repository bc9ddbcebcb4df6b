//! Bluetooth Low Energy subsystem (Central role).
//!
//! 1. **Scanner** - discovers nearby peripherals advertising the Heart
//!    Rate service (0x180D) and reports them as [`Discovery`] events.
//! 2. **Transport** - connects, looks up the service and the Heart Rate
//!    Measurement characteristic (0x2A37), and enables notifications.
//! 3. **Link state machine** - drives 1 and 2 through
//!    `Scanning -> Found -> Connecting -> Subscribed | Failed`, retrying
//!    forever with a fixed backoff.
//!
//! The radio itself lives behind the [`Scanner`] and [`Transport`]
//! traits; the firmware implements them over the Nordic SoftDevice.

pub mod adv_parser;
pub mod link;

use core::fmt;

use crate::config::BLE_MAX_ADV_SERVICES;
use crate::error::LinkError;
use embassy_time::Duration;
use heapless::{String, Vec};

/// Transport-level address of a peripheral.
///
/// `bytes` are little-endian as they come off the air; `kind` is the
/// raw BLE address type (public, random static, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceAddress {
    pub kind: u8,
    pub bytes: [u8; 6],
}

impl DeviceAddress {
    pub const fn new(kind: u8, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// A peripheral reported by the scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Discovery {
    pub address: DeviceAddress,
    /// Human-readable name (truncated to 32 bytes for `heapless::String`).
    pub name: String<32>,
    /// Received Signal Strength Indicator (dBm).
    pub rssi: i8,
    /// 16-bit service UUIDs listed in the advertisement.
    pub services: Vec<u16, BLE_MAX_ADV_SERVICES>,
}

impl Discovery {
    pub fn advertises(&self, uuid: u16) -> bool {
        self.services.contains(&uuid)
    }
}

/// Scan/discovery service.  Results arrive as [`Discovery`] events
/// through the coordinator, not through this trait.
pub trait Scanner {
    /// Start (or restart) scanning for about `duration`.
    fn start_scan(&mut self, duration: Duration);
    /// Halt scanning.  Harmless when no scan is running.
    fn stop_scan(&mut self);
}

/// Connection-oriented GATT client for a single peripheral.
///
/// The lookups are separate steps so the link state machine can abort
/// the chain at the first missing capability.
pub trait Transport {
    /// Handle to a discovered primary service.
    type Service;
    /// Handle to a discovered characteristic.
    type Characteristic;

    async fn connect(&mut self, address: &DeviceAddress) -> Result<(), LinkError>;

    async fn service(&mut self, uuid: u16) -> Option<Self::Service>;

    async fn characteristic(
        &mut self,
        service: Self::Service,
        uuid: u16,
    ) -> Option<Self::Characteristic>;

    /// Enable notifications.  Payloads are delivered to the coordinator
    /// as `Event::Notification` in transmission order.
    async fn subscribe(&mut self, characteristic: Self::Characteristic) -> Result<(), LinkError>;

    /// Release the connection, if any.  Must be idempotent.
    async fn disconnect(&mut self);
}
