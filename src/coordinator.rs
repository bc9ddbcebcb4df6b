//! Top-level driver: owns the link state machine, the beat scheduler
//! and every collaborator, and serializes all triggers through one
//! `&mut self`.
//!
//! The firmware run loop is:
//!
//! ```text
//! coordinator.start();
//! loop {
//!     coordinator.drive().await;           // connect / rescan when due
//!     let wake = coordinator.poll();       // fire due beat/off timers
//!     match select(events.receive(), Timer::at(wake)).await {
//!         Event  => coordinator.handle(event).await,
//!         Timer  => {}
//!     }
//! }
//! ```

use crate::ble::link::{LinkState, LinkStateMachine, Progress};
use crate::ble::{Discovery, Scanner, Transport};
use crate::clock::Clock;
use crate::config::NOTIFY_PAYLOAD_MAX;
use crate::error::Error;
use crate::heart_rate::{HeartRateMeasurement, HeartRateSample};
use crate::led::LedRing;
use crate::pulse::BeatScheduler;
use crate::status::{StatusLine, StatusSink};
use embassy_time::Instant;
use heapless::Vec;

/// Raw notification value as delivered by the transport.
pub type Payload = Vec<u8, NOTIFY_PAYLOAD_MAX>;

/// Asynchronous inputs from the radio.  Timer fires are not events:
/// they are deadlines the run loop sleeps towards and hands to `poll`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The scanner saw a candidate.
    Discovered(Discovery),
    /// The subscribed characteristic changed.
    Notification(Payload),
    /// The connection dropped (supervision timeout, peer disconnect).
    LinkLost,
}

pub struct Coordinator<T, S, L, R, C> {
    link: LinkStateMachine,
    pulse: BeatScheduler,
    transport: T,
    scanner: S,
    ring: L,
    status: R,
    clock: C,
}

impl<T, S, L, R, C> Coordinator<T, S, L, R, C>
where
    T: Transport,
    S: Scanner,
    L: LedRing,
    R: StatusSink,
    C: Clock,
{
    /// Wire up the collaborators.  `transport` and `scanner` must sit on
    /// an initialized radio; nothing touches them until [`start`].
    ///
    /// [`start`]: Coordinator::start
    pub fn new(transport: T, scanner: S, ring: L, status: R, clock: C) -> Self {
        Self {
            link: LinkStateMachine::new(),
            pulse: BeatScheduler::new(),
            transport,
            scanner,
            ring,
            status,
            clock,
        }
    }

    /// Bring the ring up dark, then start the first scan.
    pub fn start(&mut self) {
        self.ring.clear();
        self.ring.render();
        self.status.emit(StatusLine::Scanning);
        self.link.start_scan(&mut self.scanner, self.clock.now());
    }

    /// Dispatch one radio event.
    pub async fn handle(&mut self, event: Event) -> Result<(), Error> {
        match event {
            Event::Discovered(discovery) => {
                self.on_discovery(&discovery);
                Ok(())
            }
            Event::Notification(payload) => self.on_notification(&payload).map(|_| ()),
            Event::LinkLost => {
                self.on_link_lost().await;
                Ok(())
            }
        }
    }

    pub fn on_discovery(&mut self, discovery: &Discovery) -> bool {
        let accepted = self.link.on_discovery(discovery, &mut self.scanner);
        if accepted {
            self.status.emit(StatusLine::Found(discovery.address));
        }
        accepted
    }

    /// Decode a notification and feed it to the scheduler.  Payloads are
    /// only consumed while subscribed; a malformed one is dropped and the
    /// current schedule kept.
    pub fn on_notification(&mut self, payload: &[u8]) -> Result<Option<HeartRateSample>, Error> {
        if !self.link.is_subscribed() {
            debug!("notification while {}, dropped", self.link.state());
            return Ok(None);
        }

        let measurement = match HeartRateMeasurement::parse(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("bad HR notification: {}", e);
                self.status.emit(StatusLine::BadNotification(e));
                return Err(e.into());
            }
        };

        trace!(
            "contact {}, {} RR interval(s)",
            measurement.contact,
            measurement.rr_intervals.len()
        );

        let sample = measurement.sample();
        self.status.emit(StatusLine::HeartRate(sample.bpm));
        self.pulse.on_sample(&sample, self.clock.now());
        Ok(Some(sample))
    }

    async fn on_link_lost(&mut self) {
        if self.link.on_link_lost(self.clock.now()) {
            warn!("heart-rate sensor lost");
            self.transport.disconnect().await;
            self.pulse.halt(&mut self.ring);
            self.status.emit(StatusLine::LinkLost);
        }
    }

    /// Advance the link while not subscribed.  Link failures come back as
    /// `Err` after the retry has been scheduled.
    pub async fn drive(&mut self) -> Result<(), Error> {
        if self.link.is_subscribed() {
            return Ok(());
        }

        if self.link.state() == LinkState::Found {
            if let Some(&address) = self.link.address() {
                self.status.emit(StatusLine::Connecting {
                    address,
                    attempt: self.link.attempts() + 1,
                });
            }
        }

        match self
            .link
            .drive(&mut self.transport, &mut self.scanner, &self.clock)
            .await
        {
            Ok(Progress::Idle) => Ok(()),
            Ok(Progress::Rescanning) => {
                self.status.emit(StatusLine::Scanning);
                Ok(())
            }
            Ok(Progress::Subscribed) => {
                self.status.emit(StatusLine::Subscribed);
                Ok(())
            }
            Err(e) => {
                self.status.emit(StatusLine::ConnectFailed(e));
                Err(e.into())
            }
        }
    }

    /// Run due timer fires; returns the next instant worth waking for.
    pub fn poll(&mut self) -> Option<Instant> {
        self.pulse.poll(self.clock.now(), &mut self.ring);
        self.next_wakeup()
    }

    /// Earliest of the pulse timers, scan-window end and backoff end.
    pub fn next_wakeup(&self) -> Option<Instant> {
        match (self.pulse.next_deadline(), self.link.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // Read-only views of the owned parts, used by tests and diagnostics.

    pub fn link(&self) -> &LinkStateMachine {
        &self.link
    }

    pub fn pulse(&self) -> &BeatScheduler {
        &self.pulse
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    pub fn ring(&self) -> &L {
        &self.ring
    }

    pub fn status(&self) -> &R {
        &self.status
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
