//! The program button.
//!
//! The button pulls its line low while pressed. A press is reported once, when
//! the button is let go, and further presses are ignored for a short lockout.

use crate::io::{elapsed, InputOutputPin, Millis};

/// Presses closer together than this are merged.
pub const LOCKOUT_MS: Millis = 200;

/// Debounced program button.
pub struct Button<IO> {
    pin: IO,
    was_down: bool,
    swallow_release: bool,
    last_press: Option<Millis>,
}

impl<IO: InputOutputPin> Button<IO> {
    /// Wrap the button line. The line is only ever read.
    pub fn new(mut pin: IO) -> Self {
        pin.set_as_input();
        Self {
            pin,
            was_down: false,
            swallow_release: false,
            last_press: None,
        }
    }

    fn is_down(&mut self) -> bool {
        !self.pin.is_high()
    }

    /// True while the button is physically pressed.
    ///
    /// A press seen here has been acted on already, so [`Self::poll`] does
    /// not report its release.
    pub fn is_held(&mut self) -> bool {
        let down = self.is_down();
        self.swallow_release |= down;
        down
    }

    /// Sample the button; true once per press, on release.
    pub fn poll(&mut self, now: Millis) -> bool {
        let down = self.is_down();
        let released = core::mem::replace(&mut self.was_down, down) && !down;
        if down {
            return false;
        }

        // Any swallowed press is over once the line is back up.
        if core::mem::take(&mut self.swallow_release) || !released {
            return false;
        }

        // Every release restarts the lockout, accepted or not.
        let locked = self
            .last_press
            .replace(now)
            .is_some_and(|last| elapsed(now, last) < LOCKOUT_MS);
        if !locked {
            debug!("button pressed");
        }
        !locked
    }
}
