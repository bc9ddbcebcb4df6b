//! Connection lifecycle state machine.
//!
//! ```text
//!   Scanning --discovery--> Found --drive--> Connecting --+--> Subscribed
//!      ^                                                  |        |
//!      |                                                  v        | link lost
//!      +------------- backoff elapsed (drive) ---------- Failed <--+
//! ```
//!
//! Every failure funnels into `Failed`; the backoff is a deadline, not
//! a sleep, so timers and notifications keep flowing while it runs.

use crate::ble::{DeviceAddress, Discovery, Scanner, Transport};
use crate::clock::Clock;
use crate::config::{
    BLE_SCAN_DURATION_SECS, HEART_RATE_MEASUREMENT_UUID, HEART_RATE_SERVICE_UUID,
    RECONNECT_BACKOFF_MS,
};
use crate::error::LinkError;
use embassy_time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Scanning,
    Found,
    Connecting,
    Subscribed,
    Failed,
}

/// What a `drive` pass did, for the coordinator to report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// Nothing due yet.
    Idle,
    /// A scan was (re)started: window lapsed or backoff elapsed.
    Rescanning,
    /// The connect chain completed; notifications are enabled.
    Subscribed,
}

pub struct LinkStateMachine {
    state: LinkState,
    address: Option<DeviceAddress>,
    scan_until: Option<Instant>,
    retry_at: Option<Instant>,
    attempts: u32,
}

impl LinkStateMachine {
    pub const fn new() -> Self {
        Self {
            state: LinkState::Scanning,
            address: None,
            scan_until: None,
            retry_at: None,
            attempts: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_subscribed(&self) -> bool {
        self.state == LinkState::Subscribed
    }

    /// Address of the accepted candidate, cleared whenever a new scan begins.
    pub fn address(&self) -> Option<&DeviceAddress> {
        self.address.as_ref()
    }

    /// Connection attempts made so far (never reset).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Next instant at which `drive` has time-based work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            LinkState::Scanning => self.scan_until,
            LinkState::Failed => self.retry_at,
            _ => None,
        }
    }

    /// Begin a scan cycle.
    pub fn start_scan<S: Scanner>(&mut self, scanner: &mut S, now: Instant) {
        let window = Duration::from_secs(BLE_SCAN_DURATION_SECS);
        self.state = LinkState::Scanning;
        self.address = None;
        self.retry_at = None;
        self.scan_until = Some(now + window);
        scanner.start_scan(window);
        debug!("scan started, window ends at {}", self.scan_until);
    }

    /// Accept a candidate peripheral.  Only the first heart-rate device
    /// seen while `Scanning` is taken; the scan is halted right away.
    pub fn on_discovery<S: Scanner>(&mut self, discovery: &Discovery, scanner: &mut S) -> bool {
        if self.state != LinkState::Scanning || !discovery.advertises(HEART_RATE_SERVICE_UUID) {
            return false;
        }
        self.address = Some(discovery.address);
        self.scan_until = None;
        self.state = LinkState::Found;
        scanner.stop_scan();
        info!("candidate accepted (RSSI {})", discovery.rssi);
        true
    }

    /// One scheduler pass.  Connects when a candidate is known, restarts
    /// the scan when its window lapses or the backoff elapses.
    ///
    /// `Err` reports a failed attempt; the state machine has already
    /// released the link and scheduled the retry.
    pub async fn drive<T, S, C>(
        &mut self,
        transport: &mut T,
        scanner: &mut S,
        clock: &C,
    ) -> Result<Progress, LinkError>
    where
        T: Transport,
        S: Scanner,
        C: Clock,
    {
        match self.state {
            LinkState::Scanning => {
                let now = clock.now();
                match self.scan_until {
                    Some(until) if now < until => Ok(Progress::Idle),
                    _ => {
                        self.start_scan(scanner, now);
                        Ok(Progress::Rescanning)
                    }
                }
            }
            LinkState::Found => {
                let Some(address) = self.address else {
                    // Found without an address cannot happen; recover by scanning.
                    self.start_scan(scanner, clock.now());
                    return Ok(Progress::Rescanning);
                };
                self.state = LinkState::Connecting;
                self.attempts += 1;

                match connect_chain(transport, &address).await {
                    Ok(()) => {
                        self.state = LinkState::Subscribed;
                        info!("subscribed after {} attempt(s)", self.attempts);
                        Ok(Progress::Subscribed)
                    }
                    Err(e) => {
                        transport.disconnect().await;
                        self.fail(clock.now());
                        warn!("connect chain failed: {}", e);
                        Err(e)
                    }
                }
            }
            LinkState::Failed => {
                let now = clock.now();
                match self.retry_at {
                    Some(at) if now < at => Ok(Progress::Idle),
                    _ => {
                        self.start_scan(scanner, now);
                        Ok(Progress::Rescanning)
                    }
                }
            }
            LinkState::Connecting | LinkState::Subscribed => Ok(Progress::Idle),
        }
    }

    /// The subscribed peripheral went away.  Returns whether the state
    /// changed; the caller releases the transport.
    pub fn on_link_lost(&mut self, now: Instant) -> bool {
        if self.state != LinkState::Subscribed {
            return false;
        }
        self.fail(now);
        true
    }

    fn fail(&mut self, now: Instant) {
        self.state = LinkState::Failed;
        self.retry_at = Some(now + Duration::from_millis(RECONNECT_BACKOFF_MS));
    }
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// connect -> service -> characteristic -> subscribe, stopping at the
/// first step that fails.
async fn connect_chain<T: Transport>(
    transport: &mut T,
    address: &DeviceAddress,
) -> Result<(), LinkError> {
    transport.connect(address).await?;
    let service = transport
        .service(HEART_RATE_SERVICE_UUID)
        .await
        .ok_or(LinkError::ServiceNotFound)?;
    let characteristic = transport
        .characteristic(service, HEART_RATE_MEASUREMENT_UUID)
        .await
        .ok_or(LinkError::CharacteristicNotFound)?;
    transport.subscribe(characteristic).await
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
