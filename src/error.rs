//! Unified error type for heartring.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! None of these are fatal: the run loop logs them and carries on.

/// A Heart Rate Measurement payload could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Payload carried no flags byte at all.
    Empty,
    /// Payload is shorter than its flags declare for the rate field.
    Truncated {
        /// Bytes required by the declared rate format.
        needed: usize,
        /// Bytes actually received.
        got: usize,
    },
}

/// Stage of the connect chain that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// GAP connection could not be established.
    ConnectFailed,
    /// The peripheral does not expose the Heart Rate service (0x180D).
    ServiceNotFound,
    /// The Heart Rate Measurement characteristic (0x2A37) is missing.
    CharacteristicNotFound,
    /// Enabling notifications on the characteristic failed.
    SubscribeFailed,
}

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A notification was dropped because it could not be decoded.
    Decode(DecodeError),
    /// A connection attempt failed; a retry has been scheduled.
    Link(LinkError),
}

// Convenience conversions

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Error::Link(e)
    }
}
