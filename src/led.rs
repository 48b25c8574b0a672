//! Indicator LEDs.

/// Blink period selected while a host JTAG session is open.
pub const JTAG_CONNECTED: u16 = 150;
/// Blink period shown when nothing in particular is going on.
pub const IDLE: u16 = 500;

/// What the LEDs should show.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedPattern {
    /// One bit per indicator, lit while set.
    Static(u8),
    /// A named blink behaviour, identified by its period in milliseconds.
    Blink(u16),
}

impl From<u16> for LedPattern {
    fn from(value: u16) -> Self {
        if value < 32 {
            LedPattern::Static(value as u8)
        } else {
            LedPattern::Blink(value)
        }
    }
}

impl From<LedPattern> for u16 {
    fn from(pattern: LedPattern) -> Self {
        match pattern {
            LedPattern::Static(mask) => mask as u16,
            LedPattern::Blink(period) => period,
        }
    }
}

/// Board LED driver. Rendering blink patterns is up to the implementor.
#[cfg_attr(test, mockall::automock)]
pub trait Leds {
    /// Switch to `pattern`.
    fn set_pattern(&mut self, pattern: LedPattern);
}
