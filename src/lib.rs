//! Host-testable core of the heartring firmware.
//!
//! Everything with real control flow lives here: the Heart Rate
//! Measurement decoder, the beat scheduler, the BLE link state machine
//! and the coordinator that glues them together.  Hardware sits behind
//! the [`ble::Scanner`], [`ble::Transport`], [`led::LedRing`],
//! [`status::StatusSink`] and [`clock::Clock`] traits.
//!
//! Usage: `cargo test --lib --tests`
//!
//! Note: The embedded binary (main.rs, `--features embedded`) implements
//! those traits on the nRF52840 and runs the coordinator on Embassy.

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

// This must go first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod ble;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod heart_rate;
pub mod led;
pub mod pulse;
pub mod status;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use ble::link::{LinkState, LinkStateMachine};
pub use ble::{DeviceAddress, Discovery};
pub use coordinator::{Coordinator, Event, Payload};
pub use error::{DecodeError, Error, LinkError};
pub use heart_rate::{decode, HeartRateSample, Zone};
pub use pulse::{BeatScheduler, PulseSchedule};
pub use status::StatusLine;
