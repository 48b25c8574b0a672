//! Single-line hardware access shared by every component.

pub use embedded_hal::delay::DelayNs;

/// A pin that can be used as an input or output.
///
/// Switching to input releases the line (high impedance, or back to whatever
/// pull the board provides).
pub trait InputOutputPin {
    /// Start driving the line.
    fn set_as_output(&mut self);
    /// Set the driven level. May be called before [`Self::set_as_output`].
    fn set_high(&mut self, high: bool);

    /// Stop driving the line.
    fn set_as_input(&mut self);
    /// Sample the line.
    fn is_high(&mut self) -> bool;
}

/// Milliseconds since boot, wrapping.
pub type Millis = u32;

/// Milliseconds elapsed from `since` to `now`, tolerant of wrap-around.
#[inline]
pub fn elapsed(now: Millis, since: Millis) -> Millis {
    now.wrapping_sub(since)
}
