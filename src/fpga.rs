//! FPGA configuration lifecycle.
//!
//! The FPGA is configured from its own flash. The bridge can only hold off,
//! restart or abort that process:
//!
//! * the init line (on boards that route it) blocks configuration while low,
//! * a low pulse on the program line restarts configuration,
//! * the ISC_ENABLE instruction over JTAG drops the current configuration
//!   without a physical reset.

use crate::{
    io::{DelayNs, InputOutputPin},
    jtag::{Jtag, JtagTransport, TapState},
    switch::TakeoverGate,
};

/// ECP5 instruction that enters offline configuration mode.
pub const ISC_ENABLE: u8 = 0xC6;

/// Settle time after touching the init or program line.
pub const SETTLE_MS: u32 = 1;

/// TCK cycles spent in a stable state before ending a sequence.
const HOLD_CYCLES: u32 = 2;

/// Lifecycle state of the FPGA.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FpgaState {
    /// Unconfigured, and configuration has not been permitted.
    Offline,
    /// Allowed to configure itself, not yet triggered.
    ConfigPermitted,
    /// Configuration was triggered.
    Online,
}

/// The FPGA lifecycle controller.
pub struct Fpga<IO> {
    program: IO,
    init: IO,
    init_control: bool,
    state: FpgaState,
}

impl<IO: InputOutputPin> Fpga<IO> {
    /// Create the controller. `init` is only touched when `init_control` is set.
    pub fn new(program: IO, init: IO, init_control: bool) -> Self {
        Self {
            program,
            init,
            init_control,
            state: FpgaState::Offline,
        }
    }

    /// Leave the program line undriven, idling high.
    pub fn io_init(&mut self) {
        self.program.set_high(true);
        self.program.set_as_input();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FpgaState {
        self.state
    }

    /// Allow (or block) the FPGA's own configuration phase.
    ///
    /// A falling edge on the program line is not allowed while the FPGA is
    /// initialising, so this always waits [`SETTLE_MS`] afterwards.
    pub fn permit_configuration(&mut self, enable: bool, delay: &mut impl DelayNs) {
        if self.init_control {
            self.init.set_high(enable);
            self.init.set_as_output();
            delay.delay_ms(SETTLE_MS);
        }

        match (self.state, enable) {
            (FpgaState::Offline, true) => self.transition(FpgaState::ConfigPermitted),
            (FpgaState::ConfigPermitted, false) => self.transition(FpgaState::Offline),
            _ => {}
        }
    }

    /// Restart configuration with a program pulse.
    ///
    /// The TAP is reset first: left in some states it masks the pulse.
    pub fn trigger_reconfiguration<T: JtagTransport>(
        &mut self,
        jtag: &mut Jtag<T>,
        delay: &mut impl DelayNs,
    ) {
        jtag.init();
        jtag.go_to_state(TapState::TestLogicReset);
        jtag.run_clock(HOLD_CYCLES);
        jtag.deinit();

        self.program.set_as_output();
        self.program.set_high(false);
        delay.delay_ms(SETTLE_MS);
        self.program.set_high(true);
        self.program.set_as_input();

        self.transition(FpgaState::Online);
    }

    /// Drop the current configuration through ISC_ENABLE.
    ///
    /// The program line is left alone. Also revokes the FPGA's right to the
    /// USB port.
    pub fn force_offline<T: JtagTransport>(
        &mut self,
        jtag: &mut Jtag<T>,
        gate: &mut impl TakeoverGate,
    ) {
        let mut captured = [0u8; 1];

        jtag.init();
        jtag.go_to_state(TapState::TestLogicReset);
        jtag.go_to_state(TapState::ShiftIr);
        jtag.shift(&[ISC_ENABLE], &mut captured, 8, true);
        jtag.go_to_state(TapState::PauseIr);
        jtag.go_to_state(TapState::ShiftDr);
        jtag.shift(&[0], &mut captured, 8, true);
        jtag.go_to_state(TapState::PauseDr);
        jtag.go_to_state(TapState::RunTestIdle);
        jtag.run_clock(HOLD_CYCLES);
        jtag.deinit();

        self.set_online(false, gate);
    }

    /// True after reconfiguration, false after being forced offline.
    pub fn is_online(&self) -> bool {
        self.state == FpgaState::Online
    }

    /// Record the FPGA as online or offline. Going offline always revokes the
    /// FPGA's right to the USB port.
    pub fn set_online(&mut self, online: bool, gate: &mut impl TakeoverGate) {
        if online {
            self.transition(FpgaState::Online);
        } else {
            gate.allow_fpga_takeover_usb(false);
            self.transition(FpgaState::Offline);
        }
    }

    fn transition(&mut self, state: FpgaState) {
        if self.state != state {
            info!("FPGA {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
