//! The bridge: every component, wired together.
//!
//! Construction resolves the board's capabilities once. After that the board
//! calls [`Bridge::boot`] once and [`Bridge::task`] from its main loop, and
//! hands USB vendor requests to the [`ControlHandler`](crate::vendor::ControlHandler)
//! implementation, usually through [`VendorClass`](crate::usb::VendorClass).

use crate::{
    board::{Adc, AdvertisementKind, BoardRevision, Capabilities, PortSwitch},
    button::Button,
    fpga::{Fpga, FpgaState},
    io::{DelayNs, InputOutputPin, Millis},
    jtag::{Jtag, JtagTransport},
    led::{self, LedPattern, Leds},
    switch::{Advertisement, AdvertisementCounter, TakeoverGate, UsbAttach, UsbOwner, UsbSwitch},
};

/// Everything the bridge drives.
pub struct Hardware<J, IO, D, A, L, ADC> {
    /// JTAG lines.
    pub jtag: J,
    /// FPGA program line (active low).
    pub program: IO,
    /// FPGA init line. Only used on boards with init control.
    pub init: IO,
    /// Shared-port switch line. Only used on boards with a switch.
    pub usb_switch: IO,
    /// Program button, low while pressed.
    pub button: IO,
    /// The MCU's own USB connection.
    pub usb: A,
    /// Indicator LEDs.
    pub leds: L,
    /// Revision strap ADC channel.
    pub adc: ADC,
    /// Blocking delays.
    pub delay: D,
}

/// The bridge control plane.
pub struct Bridge<'a, J, IO, D, A, L, ADC> {
    pub(crate) revision: BoardRevision,
    pub(crate) capabilities: Capabilities,
    pub(crate) jtag: Jtag<J>,
    pub(crate) fpga: Fpga<IO>,
    pub(crate) switch: UsbSwitch<IO, A>,
    pub(crate) adv: Advertisement<'a>,
    pub(crate) button: Button<IO>,
    pub(crate) leds: L,
    pub(crate) adc: ADC,
    pub(crate) delay: D,
}

impl<'a, J, IO, D, A, L, ADC> Bridge<'a, J, IO, D, A, L, ADC>
where
    J: JtagTransport,
    IO: InputOutputPin,
    D: DelayNs,
    A: UsbAttach,
    L: Leds,
    ADC: Adc,
{
    /// Detect the board revision and build the bridge for its capabilities.
    ///
    /// `counter` is the one the advertisement interrupt writes to.
    pub fn new(
        mut hardware: Hardware<J, IO, D, A, L, ADC>,
        counter: &'a AdvertisementCounter,
        now: Millis,
    ) -> Self {
        let revision = BoardRevision::detect(&mut hardware.adc);
        let capabilities = Capabilities::from_revision(&revision);
        Self::with_capabilities(hardware, revision, capabilities, counter, now)
    }

    /// Build the bridge for explicitly chosen capabilities.
    pub fn with_capabilities(
        hardware: Hardware<J, IO, D, A, L, ADC>,
        revision: BoardRevision,
        capabilities: Capabilities,
        counter: &'a AdvertisementCounter,
        now: Millis,
    ) -> Self {
        debug!("capabilities: {:?}", capabilities);

        Bridge {
            revision,
            capabilities,
            jtag: Jtag::new(hardware.jtag),
            fpga: Fpga::new(hardware.program, hardware.init, capabilities.init_control),
            switch: UsbSwitch::new(capabilities.switch, hardware.usb_switch, hardware.usb),
            adv: Advertisement::new(counter, capabilities.advertisement, now),
            button: Button::new(hardware.button),
            leds: hardware.leds,
            adc: hardware.adc,
            delay: hardware.delay,
        }
    }

    /// Start-of-day sequence.
    ///
    /// Holding the button keeps the FPGA unconfigured and the port with the
    /// MCU. Otherwise the FPGA configures from flash and may take the port.
    pub fn boot(&mut self) {
        self.fpga.io_init();

        if self.button.is_held() {
            info!("boot interrupted by button");
            self.fpga.force_offline(&mut self.jtag, &mut self.switch);
            self.switch.take_over_usb(&mut self.delay);
            // Offline through ISC_ENABLE; letting go of init is safe now.
            self.fpga.permit_configuration(true, &mut self.delay);
        } else {
            self.fpga.permit_configuration(true, &mut self.delay);
            self.fpga.trigger_reconfiguration(&mut self.jtag, &mut self.delay);
            self.switch.allow_fpga_takeover_usb(true);

            // Nothing will ever ask for the port, so hand it over right away.
            if self.capabilities.switch != PortSwitch::None
                && self.capabilities.advertisement == AdvertisementKind::None
            {
                self.switch.hand_off_usb(&mut self.delay);
            }
        }

        self.leds.set_pattern(LedPattern::Blink(led::IDLE));
    }

    /// One iteration of the cooperative loop.
    pub fn task(&mut self, now: Millis) {
        if self.button.poll(now) {
            self.button_pressed();
        }

        self.adv.task(now);
        self.switch
            .task(&self.adv, self.fpga.is_online(), &mut self.delay);
    }

    fn button_pressed(&mut self) {
        if self.fpga.is_online() {
            self.fpga.force_offline(&mut self.jtag, &mut self.switch);
            self.switch.take_over_usb(&mut self.delay);
        } else {
            self.switch.take_over_usb(&mut self.delay);
            self.fpga.permit_configuration(true, &mut self.delay);
            self.fpga.trigger_reconfiguration(&mut self.jtag, &mut self.delay);
            self.switch.allow_fpga_takeover_usb(true);
        }
    }

    /// Detected board revision.
    pub fn revision(&self) -> BoardRevision {
        self.revision
    }

    /// Capabilities in effect.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// FPGA lifecycle state.
    pub fn fpga_state(&self) -> FpgaState {
        self.fpga.state()
    }

    /// Current owner of the shared USB port.
    pub fn usb_owner(&self) -> UsbOwner {
        self.switch.owner()
    }

    /// Whether the host currently allows the FPGA to take the port.
    pub fn fpga_takeover_allowed(&self) -> bool {
        self.switch.fpga_takeover_allowed()
    }

    /// The JTAG engine.
    pub fn jtag(&mut self) -> &mut Jtag<J> {
        &mut self.jtag
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jtag::TapState;
    use crate::mock_device::Rig;

    const FULL: Capabilities = Capabilities {
        switch: PortSwitch::Switched,
        init_control: true,
        advertisement: AdvertisementKind::Edges,
    };

    fn advertise(counter: &AdvertisementCounter) {
        for _ in 0..4 {
            counter.on_edge();
        }
    }

    #[test]
    fn boot_with_button_held_keeps_fpga_offline() {
        let rig = Rig::new();
        let counter = AdvertisementCounter::new();
        let mut bridge = rig.bridge(FULL, &counter);

        rig.button.set(false);
        bridge.boot();

        assert_eq!(bridge.usb_owner(), UsbOwner::Mcu);
        assert_eq!(bridge.fpga_state(), FpgaState::ConfigPermitted);
        assert!(!bridge.fpga_takeover_allowed());
        assert_eq!(rig.detaches.get(), 1);
        assert_eq!(bridge.jtag().current_state(), TapState::RunTestIdle);

        // Even a persistent request is not honoured while offline.
        rig.button.set(true);
        for window in 1..=3 {
            advertise(&counter);
            bridge.task(window * 200);
        }
        assert_eq!(bridge.usb_owner(), UsbOwner::Mcu);
        assert_eq!(bridge.fpga_state(), FpgaState::ConfigPermitted);
    }

    #[test]
    fn boot_hands_off_after_two_busy_windows() {
        let rig = Rig::new();
        let counter = AdvertisementCounter::new();
        let mut bridge = rig.bridge(FULL, &counter);

        bridge.boot();
        assert_eq!(bridge.fpga_state(), FpgaState::Online);
        assert!(bridge.fpga_takeover_allowed());
        assert_eq!(bridge.usb_owner(), UsbOwner::Unknown);

        // No window has closed yet, so the port is left alone.
        bridge.task(1);
        assert_eq!(bridge.usb_owner(), UsbOwner::Unknown);

        advertise(&counter);
        bridge.task(200);
        assert_eq!(bridge.usb_owner(), UsbOwner::Unknown);

        advertise(&counter);
        bridge.task(400);
        assert_eq!(bridge.usb_owner(), UsbOwner::Fpga);
        assert!(!rig.switch.is_high());
        assert_eq!(rig.detaches.get(), 1);
    }

    #[test]
    fn button_held_through_boot_is_not_a_press() {
        let rig = Rig::new();
        let counter = AdvertisementCounter::new();
        let mut bridge = rig.bridge(FULL, &counter);

        rig.button.set(false);
        bridge.boot();
        bridge.task(10);
        bridge.task(20);
        rig.button.set(true);
        bridge.task(30);

        assert_eq!(bridge.fpga_state(), FpgaState::ConfigPermitted);
        assert!(!bridge.fpga_takeover_allowed());
        assert_eq!(bridge.usb_owner(), UsbOwner::Mcu);
    }

    #[test]
    fn boot_without_advertisement_hands_off_directly() {
        let rig = Rig::new();
        let counter = AdvertisementCounter::new();
        let caps = Capabilities {
            advertisement: AdvertisementKind::None,
            ..FULL
        };
        let mut bridge = rig.bridge(caps, &counter);

        bridge.boot();
        assert_eq!(bridge.usb_owner(), UsbOwner::Fpga);
        assert_eq!(rig.detaches.get(), 1);
    }

    #[test]
    fn button_toggles_fpga() {
        let rig = Rig::new();
        let counter = AdvertisementCounter::new();
        let mut bridge = rig.bridge(FULL, &counter);
        bridge.boot();

        advertise(&counter);
        bridge.task(200);
        advertise(&counter);
        bridge.task(400);
        assert_eq!(bridge.usb_owner(), UsbOwner::Fpga);

        // Press while online: offline, and the port comes back.
        rig.button.set(false);
        bridge.task(410);
        rig.button.set(true);
        bridge.task(420);
        assert_eq!(bridge.fpga_state(), FpgaState::Offline);
        assert_eq!(bridge.usb_owner(), UsbOwner::Mcu);
        assert!(!bridge.fpga_takeover_allowed());

        // Press while offline: reconfigure and re-allow.
        rig.button.set(false);
        bridge.task(700);
        rig.button.set(true);
        bridge.task(710);
        assert_eq!(bridge.fpga_state(), FpgaState::Online);
        assert!(bridge.fpga_takeover_allowed());
        assert_eq!(bridge.usb_owner(), UsbOwner::Mcu);
    }

    #[test]
    fn revision_is_detected_once() {
        let rig = Rig::new();
        let counter = AdvertisementCounter::new();
        // 230 permille: revision 1.3
        let bridge = rig.detected_bridge(922, &counter);

        assert_eq!(bridge.revision().bcd_device(), 0x0103);
        assert_eq!(bridge.capabilities(), FULL);
    }
}
