//! Monotonic time source.
//!
//! Library components never read the hardware clock directly so they
//! can be driven from host tests.  The firmware implements this with
//! `embassy_time::Instant::now()`.

use embassy_time::Instant;

pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
