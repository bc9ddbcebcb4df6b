//! LED ring abstraction.
//!
//! The beat scheduler only ever lights the whole ring in one color or
//! blanks it, so the driver contract is three calls: `set_all`, `clear`
//! and `render`.  Nothing is visible until `render` pushes the buffer.

use smart_leds::RGB8;

/// Whole-ring LED driver.
pub trait LedRing {
    /// Set every pixel of the buffer to `color`.
    fn set_all(&mut self, color: RGB8);
    /// Set every pixel of the buffer to off.
    fn clear(&mut self);
    /// Push the buffer to the hardware.  Write failures are the
    /// driver's to log; a missed frame is corrected by the next one.
    fn render(&mut self);
}
