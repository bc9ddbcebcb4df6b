//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place.  The device
//! is headless: there is no runtime configuration.

// BLE

/// Heart Rate Service (16-bit SIG UUID).
pub const HEART_RATE_SERVICE_UUID: u16 = 0x180D;

/// Heart Rate Measurement characteristic (16-bit SIG UUID).
pub const HEART_RATE_MEASUREMENT_UUID: u16 = 0x2A37;

/// Duration of a BLE scan window (seconds).  The scan is restarted
/// whenever a window lapses without a candidate.
pub const BLE_SCAN_DURATION_SECS: u64 = 10;

/// Scan interval / window (in 0.625 ms units).  160 = 100 ms, 158 ≈ 99 ms:
/// the radio listens almost continuously while scanning.
pub const BLE_SCAN_INTERVAL: u32 = 160;
pub const BLE_SCAN_WINDOW: u32 = 158;

/// Maximum number of 16-bit service UUIDs kept from one advertisement.
pub const BLE_MAX_ADV_SERVICES: usize = 8;

/// BLE connection interval range (in 1.25 ms units).
/// Heart-rate sensors notify about once per second, so latency is
/// traded for radio time: 24 = 30 ms, 40 = 50 ms.
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// How long a connect attempt looks for the peer (in 10 ms units). 500 = 5 s.
pub const BLE_CONNECT_TIMEOUT: u16 = 500;

/// Largest notification payload carried through the event queue
/// (default ATT MTU 23 minus the 3-byte notification header).
pub const NOTIFY_PAYLOAD_MAX: usize = 20;

/// Delay between a failed connection attempt and the next scan (ms).
pub const RECONNECT_BACKOFF_MS: u64 = 5_000;

// Heart rate

/// Milliseconds per minute, the numerator of the beat interval.
pub const MS_PER_MINUTE: u32 = 60_000;

/// Rates strictly above this are the High zone.
pub const ZONE_HIGH_ABOVE_BPM: u16 = 90;

/// Rates at or above this (and not High) are the Mid zone.
pub const ZONE_MID_FROM_BPM: u16 = 70;

// LED ring
//
// WS2812 ring on P0.12 (data in), driven by SPIM3 MOSI.

/// Number of pixels on the ring.
pub const RING_LED_COUNT: usize = 24;

/// Global ring brightness (0-255), applied with `smart_leds::brightness`.  Keeps a 24-pixel ring well inside
/// a small LiPo's budget.
pub const RING_BRIGHTNESS: u8 = 40;

/// How long the ring stays lit after each beat (ms).
pub const PULSE_ON_TIME_MS: u64 = 250;

/// How long the run loop sleeps when no deadline is pending (ms).
pub const IDLE_POLL_MS: u64 = 1_000;
