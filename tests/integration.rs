//! Integration tests for the heartring coordinator.
//!
//! The radio, ring, status sink and clock are host mocks; everything
//! else is the real library.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embassy_futures::block_on;
use embassy_time::{Duration, Instant};
use heartring::ble::{Scanner, Transport};
use heartring::clock::Clock;
use heartring::config::{HEART_RATE_SERVICE_UUID, RECONNECT_BACKOFF_MS};
use heartring::led::LedRing;
use heartring::status::StatusSink;
use heartring::{
    Coordinator, DecodeError, DeviceAddress, Discovery, Error, Event, LinkError, LinkState,
    Payload, StatusLine, Zone,
};
use smart_leds::RGB8;

// ═══════════════════════════════════════════════════════════════════════════
// Mock collaborators
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
struct TestClock(Rc<Cell<u64>>);

impl TestClock {
    fn set(&self, ms: u64) {
        self.0.set(ms);
    }

    fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }

    fn ms(&self) -> u64 {
        self.0.get()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.0.get())
    }
}

#[derive(Default)]
struct TestScanner {
    starts: u32,
    stops: u32,
    scanning: bool,
}

impl Scanner for TestScanner {
    fn start_scan(&mut self, _duration: Duration) {
        self.starts += 1;
        self.scanning = true;
    }

    fn stop_scan(&mut self) {
        self.stops += 1;
        self.scanning = false;
    }
}

/// Fails the first `failures` connects, then succeeds.  Records the
/// clock at every connect attempt.
struct TestTransport {
    clock: TestClock,
    failures: u32,
    connect_times: Vec<u64>,
    subscribes: u32,
    disconnects: u32,
}

impl TestTransport {
    fn failing(clock: &TestClock, failures: u32) -> Self {
        Self {
            clock: clock.clone(),
            failures,
            connect_times: Vec::new(),
            subscribes: 0,
            disconnects: 0,
        }
    }
}

impl Transport for TestTransport {
    type Service = ();
    type Characteristic = ();

    async fn connect(&mut self, _address: &DeviceAddress) -> Result<(), LinkError> {
        self.connect_times.push(self.clock.ms());
        if self.failures > 0 {
            self.failures -= 1;
            return Err(LinkError::ConnectFailed);
        }
        Ok(())
    }

    async fn service(&mut self, _uuid: u16) -> Option<()> {
        Some(())
    }

    async fn characteristic(&mut self, _service: (), _uuid: u16) -> Option<()> {
        Some(())
    }

    async fn subscribe(&mut self, _characteristic: ()) -> Result<(), LinkError> {
        self.subscribes += 1;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

/// Records what is visible on the ring, with the time of every change.
struct TestRing {
    clock: TestClock,
    pending: Option<RGB8>,
    visible: Option<RGB8>,
    changes: Vec<(u64, Option<RGB8>)>,
}

impl TestRing {
    fn new(clock: &TestClock) -> Self {
        Self {
            clock: clock.clone(),
            pending: None,
            visible: None,
            changes: Vec::new(),
        }
    }
}

impl LedRing for TestRing {
    fn set_all(&mut self, color: RGB8) {
        self.pending = Some(color);
    }

    fn clear(&mut self) {
        self.pending = None;
    }

    fn render(&mut self) {
        if self.pending != self.visible || self.changes.is_empty() {
            self.changes.push((self.clock.ms(), self.pending));
        }
        self.visible = self.pending;
    }
}

#[derive(Clone, Default)]
struct TestStatus(Rc<RefCell<Vec<String>>>);

impl TestStatus {
    fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    fn contains(&self, line: &str) -> bool {
        self.0.borrow().iter().any(|l| l == line)
    }
}

impl StatusSink for TestStatus {
    fn emit(&mut self, line: StatusLine) {
        self.0.borrow_mut().push(line.to_string());
    }
}

type TestCoordinator = Coordinator<TestTransport, TestScanner, TestRing, TestStatus, TestClock>;

fn coordinator(failures: u32) -> (TestCoordinator, TestClock, TestStatus) {
    let clock = TestClock::default();
    let status = TestStatus::default();
    let c = Coordinator::new(
        TestTransport::failing(&clock, failures),
        TestScanner::default(),
        TestRing::new(&clock),
        status.clone(),
        clock.clone(),
    );
    (c, clock, status)
}

fn hr_sensor() -> Discovery {
    let mut services = heapless::Vec::new();
    services.push(HEART_RATE_SERVICE_UUID).unwrap();
    Discovery {
        address: DeviceAddress::new(1, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
        name: heapless::String::try_from("Polar OH1").unwrap(),
        rssi: -55,
        services,
    }
}

fn payload(bytes: &[u8]) -> Payload {
    Payload::from_slice(bytes).unwrap()
}

fn subscribed() -> (TestCoordinator, TestClock, TestStatus) {
    let (mut c, clock, status) = coordinator(0);
    c.start();
    block_on(c.handle(Event::Discovered(hr_sensor()))).unwrap();
    block_on(c.drive()).unwrap();
    assert_eq!(c.link().state(), LinkState::Subscribed);
    (c, clock, status)
}

/// Step the clock in 1 ms increments, polling the scheduler each time.
fn run_until(c: &mut TestCoordinator, clock: &TestClock, until_ms: u64) {
    while clock.ms() < until_ms {
        clock.advance(1);
        c.poll();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Start-up and discovery
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn start_blanks_ring_then_scans() {
    let (mut c, _clock, status) = coordinator(0);
    c.start();

    assert_eq!(c.ring().changes, vec![(0, None)]);
    assert_eq!(c.scanner().starts, 1);
    assert_eq!(c.link().state(), LinkState::Scanning);
    assert_eq!(
        status.lines(),
        vec!["Starting BLE scan for heart-rate sensor...".to_string()]
    );
}

#[test]
fn discovery_to_subscription() {
    let (c, _clock, status) = subscribed();

    assert_eq!(c.scanner().stops, 1);
    assert!(!c.scanner().scanning);
    assert_eq!(c.transport().subscribes, 1);
    assert!(status.contains("Found HR service on 66:55:44:33:22:11"));
    assert!(status.contains("Connecting to 66:55:44:33:22:11 (attempt 1)"));
    assert!(status.contains("Subscribed to HR notifications"));
}

#[test]
fn drive_is_a_no_op_once_subscribed() {
    let (mut c, clock, _status) = subscribed();
    clock.set(120_000);
    block_on(c.drive()).unwrap();
    assert_eq!(c.transport().connect_times.len(), 1);
    assert_eq!(c.scanner().starts, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Retry loop
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn three_failures_then_success() {
    let (mut c, clock, status) = coordinator(3);
    c.start();

    for attempt in 1..=4u32 {
        block_on(c.handle(Event::Discovered(hr_sensor()))).unwrap();
        let result = block_on(c.drive());

        if attempt <= 3 {
            assert_eq!(result, Err(Error::Link(LinkError::ConnectFailed)));
            assert_eq!(c.link().state(), LinkState::Failed);

            // Nothing happens until the backoff has fully elapsed.
            clock.advance(RECONNECT_BACKOFF_MS - 1);
            block_on(c.drive()).unwrap();
            assert_eq!(c.link().state(), LinkState::Failed);

            clock.advance(1);
            block_on(c.drive()).unwrap();
            assert_eq!(c.link().state(), LinkState::Scanning);
            assert!(c.link().address().is_none());
        } else {
            assert_eq!(result, Ok(()));
        }
    }

    assert_eq!(c.link().state(), LinkState::Subscribed);
    assert_eq!(c.link().attempts(), 4);
    assert_eq!(c.transport().connect_times, vec![0, 5_000, 10_000, 15_000]);
    assert_eq!(c.transport().disconnects, 3);
    // Initial scan plus one rescan per failure.
    assert_eq!(c.scanner().starts, 4);
    assert_eq!(c.scanner().stops, 4);
    assert_eq!(
        status
            .lines()
            .iter()
            .filter(|l| l.starts_with("Connect failed"))
            .count(),
        3
    );
    assert!(status.contains("Connecting to 66:55:44:33:22:11 (attempt 4)"));
}

#[test]
fn next_wakeup_tracks_backoff() {
    let (mut c, _clock, _status) = coordinator(1);
    c.start();
    block_on(c.handle(Event::Discovered(hr_sensor()))).unwrap();
    let _ = block_on(c.drive());
    assert_eq!(c.next_wakeup(), Some(Instant::from_millis(RECONNECT_BACKOFF_MS)));
}

#[test]
fn notifications_ignored_until_subscribed() {
    let (mut c, _clock, status) = coordinator(0);
    c.start();
    assert_eq!(c.on_notification(&[0x00, 75]), Ok(None));
    assert!(!c.pulse().schedule().armed);
    assert!(!status.contains("Heart Rate: 75 BPM"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Notification → pulse pipeline
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn notification_drives_pulse() {
    let (mut c, clock, status) = subscribed();

    block_on(c.handle(Event::Notification(payload(&[0x00, 0x4B])))).unwrap();
    assert!(status.contains("Heart Rate: 75 BPM"));
    assert_eq!(c.pulse().schedule().interval_ms, 800);
    assert_eq!(c.next_wakeup(), Some(Instant::from_millis(800)));

    run_until(&mut c, &clock, 2_000);
    let green = Some(Zone::Mid.color());
    assert_eq!(
        c.ring().changes,
        vec![(0, None), (800, green), (1_050, None), (1_600, green), (1_850, None)]
    );
}

#[test]
fn sixteen_bit_payload_decodes() {
    let (mut c, _clock, _status) = subscribed();
    let sample = c.on_notification(&[0x01, 0x4B, 0x00]).unwrap().unwrap();
    assert_eq!(sample.bpm, 75);
}

#[test]
fn full_measurement_payload_drives_pulse() {
    let (mut c, _clock, status) = subscribed();
    // Contact detected, energy 16 kJ, one RR interval of 1024/1024 s.
    let sample = c
        .on_notification(&[0x1E, 72, 0x10, 0x00, 0x00, 0x04])
        .unwrap()
        .unwrap();
    assert_eq!(sample.bpm, 72);
    assert_eq!(sample.zone, Zone::Mid);
    assert_eq!(c.pulse().schedule().interval_ms, 833);
    assert!(status.contains("Heart Rate: 72 BPM"));
}

#[test]
fn late_poll_keeps_ring_lit_for_full_on_time() {
    let (mut c, clock, _status) = subscribed();
    block_on(c.handle(Event::Notification(payload(&[0x00, 60])))).unwrap();

    clock.set(1_300);
    assert_eq!(c.poll(), Some(Instant::from_millis(1_550)));
    assert_eq!(c.ring().visible, Some(Zone::Low.color()));

    run_until(&mut c, &clock, 1_550);
    assert_eq!(c.ring().visible, None);
}

#[test]
fn zero_bpm_keeps_schedule() {
    let (mut c, clock, _status) = subscribed();
    block_on(c.handle(Event::Notification(payload(&[0x00, 75])))).unwrap();
    clock.set(300);
    block_on(c.handle(Event::Notification(payload(&[0x00, 0])))).unwrap();

    assert_eq!(c.pulse().schedule().interval_ms, 800);
    assert_eq!(c.pulse().schedule().color, Zone::Mid.color());
    assert_eq!(c.next_wakeup(), Some(Instant::from_millis(800)));
}

#[test]
fn malformed_payload_rejected_and_schedule_kept() {
    let (mut c, clock, status) = subscribed();
    block_on(c.handle(Event::Notification(payload(&[0x00, 100])))).unwrap();
    let before = *c.pulse().schedule();

    clock.set(100);
    let result = block_on(c.handle(Event::Notification(payload(&[0x00]))));
    assert_eq!(
        result,
        Err(Error::Decode(DecodeError::Truncated { needed: 2, got: 1 }))
    );
    assert_eq!(*c.pulse().schedule(), before);
    assert_eq!(c.next_wakeup(), Some(Instant::from_millis(600)));
    assert!(status.contains("Dropped malformed HR notification"));
    assert_eq!(c.link().state(), LinkState::Subscribed);
}

#[test]
fn faster_rate_supersedes_slower_cadence() {
    let (mut c, clock, _status) = subscribed();
    block_on(c.handle(Event::Notification(payload(&[0x00, 60])))).unwrap();
    clock.set(200);
    block_on(c.handle(Event::Notification(payload(&[0x00, 120])))).unwrap();

    run_until(&mut c, &clock, 1_300);
    let lit_at: Vec<u64> = c
        .ring()
        .changes
        .iter()
        .filter(|(_, color)| color.is_some())
        .map(|(t, _)| *t)
        .collect();
    assert_eq!(lit_at, vec![700, 1_200]);
}

#[test]
fn zone_color_follows_rate() {
    let (mut c, clock, _status) = subscribed();
    block_on(c.handle(Event::Notification(payload(&[0x00, 91])))).unwrap();
    run_until(&mut c, &clock, 700);
    assert_eq!(c.ring().visible, Some(Zone::High.color()));

    block_on(c.handle(Event::Notification(payload(&[0x00, 69])))).unwrap();
    run_until(&mut c, &clock, 700 + 869);
    assert_eq!(c.ring().visible, Some(Zone::Low.color()));
}

// ═══════════════════════════════════════════════════════════════════════════
// Device loss
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn link_loss_halts_pulses_and_rescans() {
    let (mut c, clock, status) = subscribed();
    block_on(c.handle(Event::Notification(payload(&[0x00, 60])))).unwrap();
    run_until(&mut c, &clock, 1_100);
    assert!(c.ring().visible.is_some());

    block_on(c.handle(Event::LinkLost)).unwrap();
    assert_eq!(c.ring().visible, None);
    assert_eq!(c.link().state(), LinkState::Failed);
    assert_eq!(c.transport().disconnects, 1);
    assert!(!c.pulse().schedule().armed);
    assert!(status.contains("Sensor lost; retrying in 5s"));

    run_until(&mut c, &clock, 1_100 + RECONNECT_BACKOFF_MS);
    block_on(c.drive()).unwrap();
    assert_eq!(c.link().state(), LinkState::Scanning);
    assert_eq!(c.scanner().starts, 2);
    assert_eq!(c.ring().visible, None);
}

#[test]
fn link_loss_while_not_subscribed_is_ignored() {
    let (mut c, _clock, status) = coordinator(0);
    c.start();
    block_on(c.handle(Event::LinkLost)).unwrap();
    assert_eq!(c.link().state(), LinkState::Scanning);
    assert_eq!(c.transport().disconnects, 0);
    assert!(!status.contains("Sensor lost; retrying in 5s"));
}
