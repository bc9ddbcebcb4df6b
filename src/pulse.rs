//! Beat scheduler - turns the latest heart-rate sample into ring pulses.
//!
//! Two deadlines stand in for the two timers:
//!
//! - **beat**: periodic, every `interval_ms`.  Each fire lights the ring.
//! - **off**: one-shot, `PULSE_ON_TIME_MS` after the latest beat.
//!   Blanks the ring.
//!
//! Re-arming a timer is replacing its deadline, so a stale fire can
//! never race in after a re-arm.  A beat that lands while an off is
//! pending simply pushes the off back: with intervals shorter than the
//! on-time the ring stays lit instead of flickering.

use crate::config::{MS_PER_MINUTE, PULSE_ON_TIME_MS};
use crate::heart_rate::HeartRateSample;
use crate::led::LedRing;
use embassy_time::{Duration, Instant};
use smart_leds::RGB8;

/// What the ring should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulseSchedule {
    pub interval_ms: u32,
    pub color: RGB8,
    pub armed: bool,
}

impl PulseSchedule {
    const fn idle() -> Self {
        Self {
            interval_ms: 0,
            color: RGB8 { r: 0, g: 0, b: 0 },
            armed: false,
        }
    }
}

pub struct BeatScheduler {
    schedule: PulseSchedule,
    next_beat: Option<Instant>,
    off_at: Option<Instant>,
    lit: bool,
    beats: u32,
}

impl BeatScheduler {
    pub const fn new() -> Self {
        Self {
            schedule: PulseSchedule::idle(),
            next_beat: None,
            off_at: None,
            lit: false,
            beats: 0,
        }
    }

    pub fn schedule(&self) -> &PulseSchedule {
        &self.schedule
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Beats fired since power-up.
    pub fn beats(&self) -> u32 {
        self.beats
    }

    /// Earliest pending timer fire.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.next_beat, self.off_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Take a new sample.  Returns `true` if the beat timer was re-armed.
    ///
    /// A zero rate leaves the schedule untouched.  The color always
    /// follows the sample; the cadence restarts from `now` only when the
    /// interval changes, so a steady rate keeps its phase.
    pub fn on_sample(&mut self, sample: &HeartRateSample, now: Instant) -> bool {
        if sample.bpm == 0 {
            return false;
        }
        let interval_ms = MS_PER_MINUTE / u32::from(sample.bpm);
        if interval_ms == 0 {
            return false;
        }

        self.schedule.color = sample.zone.color();
        if self.schedule.armed && self.schedule.interval_ms == interval_ms {
            return false;
        }

        self.schedule.interval_ms = interval_ms;
        self.schedule.armed = true;
        self.next_beat = Some(now + self.interval());
        trace!("beat re-armed: {} ms", interval_ms);
        true
    }

    /// Run every timer fire due at or before `now`, oldest first, and
    /// return the next deadline.
    pub fn poll<L: LedRing>(&mut self, now: Instant, ring: &mut L) -> Option<Instant> {
        loop {
            let beat_due = self.next_beat.filter(|&at| at <= now);
            let off_due = self.off_at.filter(|&at| at <= now);

            match (beat_due, off_due) {
                // A beat at the same instant as the off supersedes it.
                (Some(beat), Some(off)) if off < beat => self.fire_off(ring),
                (Some(beat), _) => self.fire_beat(beat, now, ring),
                (None, Some(_)) => self.fire_off(ring),
                (None, None) => return self.next_deadline(),
            }
        }
    }

    /// Stop pulsing: cancel both timers and blank the ring.
    pub fn halt<L: LedRing>(&mut self, ring: &mut L) {
        self.schedule.armed = false;
        self.next_beat = None;
        self.off_at = None;
        if self.lit {
            ring.clear();
            ring.render();
            self.lit = false;
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.schedule.interval_ms))
    }

    fn fire_beat<L: LedRing>(&mut self, at: Instant, now: Instant, ring: &mut L) {
        ring.set_all(self.schedule.color);
        ring.render();
        self.lit = true;
        self.beats = self.beats.wrapping_add(1);
        // On-time runs from the actual fire; the cadence stays on `at`.
        self.off_at = Some(now.max(at) + Duration::from_millis(PULSE_ON_TIME_MS));

        // A late poll skips the missed beats instead of flashing them all.
        let interval = self.interval();
        let mut next = at + interval;
        if next <= now {
            let behind = (now - at).as_ticks() / interval.as_ticks();
            next = at + interval * (behind + 1) as u32;
            debug!("skipped {} late beat(s)", behind);
        }
        self.next_beat = Some(next);
    }

    fn fire_off<L: LedRing>(&mut self, ring: &mut L) {
        ring.clear();
        ring.render();
        self.lit = false;
        self.off_at = None;
    }
}

impl Default for BeatScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
