//! Human-readable status reporting.
//!
//! Separate from logging: these are the lines a wearer (or a serial
//! plotter) sees.  Sinks are fire-and-forget and must never block.

use core::fmt;

use crate::ble::DeviceAddress;
use crate::config::RECONNECT_BACKOFF_MS;
use crate::error::{DecodeError, LinkError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusLine {
    Scanning,
    Found(DeviceAddress),
    Connecting { address: DeviceAddress, attempt: u32 },
    Subscribed,
    ConnectFailed(LinkError),
    LinkLost,
    HeartRate(u16),
    BadNotification(DecodeError),
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let retry_secs = RECONNECT_BACKOFF_MS / 1_000;
        match self {
            StatusLine::Scanning => f.write_str("Starting BLE scan for heart-rate sensor..."),
            StatusLine::Found(address) => write!(f, "Found HR service on {address}"),
            StatusLine::Connecting { address, attempt } => {
                write!(f, "Connecting to {address} (attempt {attempt})")
            }
            StatusLine::Subscribed => f.write_str("Subscribed to HR notifications"),
            StatusLine::ConnectFailed(stage) => {
                let why = match stage {
                    LinkError::ConnectFailed => "no connection",
                    LinkError::ServiceNotFound => "no HR service",
                    LinkError::CharacteristicNotFound => "no HR characteristic",
                    LinkError::SubscribeFailed => "subscribe refused",
                };
                write!(f, "Connect failed ({why}); retrying in {retry_secs}s")
            }
            StatusLine::LinkLost => write!(f, "Sensor lost; retrying in {retry_secs}s"),
            StatusLine::HeartRate(bpm) => write!(f, "Heart Rate: {bpm} BPM"),
            StatusLine::BadNotification(_) => f.write_str("Dropped malformed HR notification"),
        }
    }
}

/// Line-oriented status output.
pub trait StatusSink {
    fn emit(&mut self, line: StatusLine);
}
