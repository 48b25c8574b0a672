//! Bitbanging (GPIO-driven) JTAG transport.
//!
//! Boards without a SPI block on the JTAG lines can use this directly; the
//! bulk segment is then shifted byte by byte over the same pins. Boards that
//! share the lines with another peripheral wrap it and restore that
//! peripheral's pinmux in `deinit`.

use core::num::NonZeroU32;

use crate::{
    io::{DelayNs, InputOutputPin},
    jtag::JtagTransport,
};

/// Clock cycle with data output and input
macro_rules! clock_io {
    ($self:expr, $tms:expr, $tdi:expr) => {{
        $self.tms.set_high($tms);
        $self.tdi.set_high($tdi);
        $self.tck.set_high(false);
        $self.wait();
        let tdo = $self.tdo.is_high();
        $self.tck.set_high(true);
        $self.wait();
        tdo
    }};
}

/// A trait for a delay implementation that can be used to delay for a number of CPU cycles.
pub trait DelayCycles: DelayNs {
    /// Core clock in Hz.
    fn cpu_clock(&self) -> u32;
    /// Busy-wait `cycles` core clocks.
    fn delay_cycles(&mut self, cycles: u32);
}

/// GPIO-driven JTAG transport.
pub struct BitbangJtag<IO, D>
where
    IO: InputOutputPin,
    D: DelayCycles,
{
    tck: IO,
    tms: IO,
    tdi: IO,
    tdo: IO,
    delay: D,
    half_period: u32,
    target_clock: Option<NonZeroU32>,
}

impl<IO, D> BitbangJtag<IO, D>
where
    IO: InputOutputPin,
    D: DelayCycles,
{
    /// Wrap the four JTAG lines. They stay released until `init`.
    pub fn new(tck: IO, tms: IO, tdi: IO, tdo: IO, delay: D) -> Self {
        let mut this = Self {
            tck,
            tms,
            tdi,
            tdo,
            delay,
            half_period: 0,
            target_clock: None,
        };
        this.release_pins();
        this
    }

    /// Request a maximum TCK frequency; applied on the next `init`.
    pub fn set_clock(&mut self, max_frequency: u32) -> bool {
        debug!("set frequency({})", max_frequency);
        match NonZeroU32::new(max_frequency) {
            Some(frequency) => {
                self.target_clock = Some(frequency);
                true
            }
            _ => false,
        }
    }

    fn apply_clock(&mut self) {
        if let Some(target_clock) = self.target_clock.take() {
            self.half_period = (self.delay.cpu_clock() / 2)
                .div_ceil(target_clock.get())
                .max(1);
        }
    }

    fn release_pins(&mut self) {
        self.tck.set_as_input();
        self.tms.set_as_input();
        self.tdi.set_as_input();
        self.tdo.set_as_input();
    }

    #[inline(always)]
    fn wait(&mut self) {
        if self.half_period > 0 {
            self.delay.delay_cycles(self.half_period);
        }
    }
}

impl<IO, D> JtagTransport for BitbangJtag<IO, D>
where
    IO: InputOutputPin,
    D: DelayCycles,
{
    fn init(&mut self) {
        self.apply_clock();

        self.tck.set_high(true);
        self.tck.set_as_output();

        self.tms.set_high(true);
        self.tms.set_as_output();

        self.tdi.set_high(false);
        self.tdi.set_as_output();

        self.tdo.set_as_input();
    }

    fn deinit(&mut self) {
        self.release_pins();
    }

    fn clock(&mut self, tms: bool, tdi: bool) -> bool {
        clock_io!(self, tms, tdi)
    }

    fn bulk_enable(&mut self) {}

    fn bulk_transfer(&mut self, tx: &[u8], rx: &mut [u8]) {
        for (out, inp) in tx.iter().zip(rx.iter_mut()) {
            let mut captured = 0u8;
            for bit in 0..8 {
                if clock_io!(self, false, out & (1 << bit) != 0) {
                    captured |= 1 << bit;
                }
            }
            *inp = captured;
        }
    }

    fn bulk_release(&mut self) {}
}
