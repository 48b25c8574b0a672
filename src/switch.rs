//! USB port arbitration.
//!
//! One physical USB port is shared between the MCU and the FPGA. The arbiter
//! owns who currently has it, performs the switch-over, and decides from the
//! FPGA's advertisement whether a switch-over is due.

use crate::{
    board::{AdvertisementKind, PortSwitch},
    io::{DelayNs, InputOutputPin},
};

mod adv;

pub use adv::{
    Advertisement, AdvertisementCounter, BEACON_TIMEOUT_MS, EDGE_THRESHOLD, STABLE_WINDOWS,
    WINDOW_MS,
};

/// How long the MCU stays detached so the host sees the port go away.
pub const DETACH_SETTLE_MS: u32 = 100;

/// Switch line level that selects the MCU side. The FPGA side is the opposite.
const MCU_LEVEL: bool = true;

/// The MCU's own connection to the shared port.
#[cfg_attr(test, mockall::automock)]
pub trait UsbAttach {
    /// Drop off the bus.
    fn detach(&mut self);
    /// Reconnect to the bus.
    fn attach(&mut self);
}

/// Current owner of the shared port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbOwner {
    /// Nobody has switched the port since reset.
    Unknown,
    /// The MCU.
    Mcu,
    /// The FPGA.
    Fpga,
}

/// The host-granted right of the FPGA to own the port.
///
/// Anything that takes the FPGA offline must clear it.
pub trait TakeoverGate {
    /// Grant or revoke the right.
    fn allow_fpga_takeover_usb(&mut self, allow: bool);
    /// Whether the right is currently granted.
    fn fpga_takeover_allowed(&self) -> bool;
}

/// The USB port arbiter.
pub struct UsbSwitch<IO, A> {
    kind: PortSwitch,
    line: IO,
    usb: A,
    owner: UsbOwner,
    takeover_allowed: bool,
}

impl<IO, A> UsbSwitch<IO, A>
where
    IO: InputOutputPin,
    A: UsbAttach,
{
    /// Create the arbiter. `line` is only touched when `kind` has a switch.
    pub fn new(kind: PortSwitch, line: IO, usb: A) -> Self {
        Self {
            kind,
            line,
            usb,
            owner: UsbOwner::Unknown,
            takeover_allowed: false,
        }
    }

    /// Current owner.
    pub fn owner(&self) -> UsbOwner {
        self.owner
    }

    /// Switching mechanism in use.
    pub fn kind(&self) -> PortSwitch {
        self.kind
    }

    fn reconnect(&mut self, delay: &mut impl DelayNs) {
        self.usb.detach();
        delay.delay_ms(DETACH_SETTLE_MS);
        self.usb.attach();
    }

    /// Give the port to the MCU. No-op if it already has it.
    pub fn take_over_usb(&mut self, delay: &mut impl DelayNs) {
        if self.owner == UsbOwner::Mcu {
            return;
        }

        if self.kind != PortSwitch::None {
            self.line.set_high(MCU_LEVEL);
            self.line.set_as_output();
            self.reconnect(delay);
        }

        self.owner = UsbOwner::Mcu;
        info!("USB port owned by MCU");
    }

    /// Give the port to the FPGA. No-op if it already has it, or if there is
    /// nothing to switch. Whether the FPGA may have it is the caller's call.
    pub fn hand_off_usb(&mut self, delay: &mut impl DelayNs) {
        if self.owner == UsbOwner::Fpga {
            return;
        }

        match self.kind {
            PortSwitch::None => return,
            PortSwitch::Switched => {
                self.line.set_high(!MCU_LEVEL);
                self.line.set_as_output();
                self.reconnect(delay);
            }
            PortSwitch::OpenDrain => self.line.set_as_input(),
        }

        self.owner = UsbOwner::Fpga;
        info!("USB port owned by FPGA");
    }

    /// Periodic arbitration: reclaim the port when the FPGA is not asking
    /// for it, and hand it over once a stable request is allowed.
    pub fn task(&mut self, adv: &Advertisement<'_>, fpga_online: bool, delay: &mut impl DelayNs) {
        if adv.kind() == AdvertisementKind::None || !adv.has_verdict() {
            return;
        }

        if !adv.requesting_port() {
            self.take_over_usb(delay);
        } else if self.takeover_allowed && fpga_online && adv.request_is_stable() {
            self.hand_off_usb(delay);
        }
    }
}

impl<IO, A> TakeoverGate for UsbSwitch<IO, A> {
    fn allow_fpga_takeover_usb(&mut self, allow: bool) {
        if self.takeover_allowed != allow {
            debug!("FPGA USB takeover allowed: {}", allow);
        }
        self.takeover_allowed = allow;
    }

    fn fpga_takeover_allowed(&self) -> bool {
        self.takeover_allowed
    }
}
