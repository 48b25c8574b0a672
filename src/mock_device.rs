//! Test doubles for the single-line collaborators.
//!
//! Trait-level collaborators are mocked with `mockall` next to their traits;
//! pins are easier to reason about as recorded event streams.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::board::{BoardRevision, Capabilities, MockAdc};
use crate::bridge::{Bridge, Hardware};
use crate::driver::bitbang::DelayCycles;
use crate::io::{DelayNs, InputOutputPin};
use crate::jtag::MockJtagTransport;
use crate::led::{LedPattern, MockLeds};
use crate::switch::{AdvertisementCounter, MockUsbAttach};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinEvent {
    Output(&'static str),
    Input(&'static str),
    Level(&'static str, bool),
}

impl PinEvent {
    fn name(&self) -> &'static str {
        match self {
            PinEvent::Output(n) | PinEvent::Input(n) | PinEvent::Level(n, _) => n,
        }
    }
}

/// Event log shared by any number of pins.
#[derive(Clone, Default)]
pub struct PinLog(Rc<RefCell<Vec<PinEvent>>>);

impl PinLog {
    fn push(&self, event: PinEvent) {
        self.0.borrow_mut().push(event);
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, event: &PinEvent) -> bool {
        self.0.borrow().contains(event)
    }

    pub fn count(&self, event: &PinEvent) -> usize {
        self.0.borrow().iter().filter(|e| *e == event).count()
    }

    pub fn last_for(&self, name: &str) -> Option<PinEvent> {
        self.0.borrow().iter().rev().find(|e| e.name() == name).copied()
    }

    /// Events for one pin, in order.
    pub fn for_pin(&self, name: &str) -> Vec<PinEvent> {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.name() == name)
            .copied()
            .collect()
    }
}

/// Outside view of a [`FakePin`]: lets a test play the other end of the wire.
#[derive(Clone)]
pub struct PinHandle(Rc<Cell<bool>>);

impl PinHandle {
    /// A line idling high, not yet attached to a pin.
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub fn set(&self, high: bool) {
        self.0.set(high);
    }

    pub fn is_high(&self) -> bool {
        self.0.get()
    }
}

pub struct FakePin {
    name: &'static str,
    log: PinLog,
    level: PinHandle,
    source: Option<PinHandle>,
}

impl FakePin {
    pub fn new(name: &'static str, log: &PinLog) -> Self {
        Self {
            name,
            log: log.clone(),
            level: PinHandle::new(),
            source: None,
        }
    }

    pub fn handle(&self) -> PinHandle {
        self.level.clone()
    }

    /// Make this pin the one behind `handle`.
    pub fn share(&mut self, handle: &PinHandle) {
        self.level = handle.clone();
    }

    /// Read this pin's level from another pin.
    pub fn mirror(&mut self, other: &FakePin) {
        self.source = Some(other.handle());
    }
}

impl InputOutputPin for FakePin {
    fn set_as_output(&mut self) {
        self.log.push(PinEvent::Output(self.name));
    }

    fn set_high(&mut self, high: bool) {
        self.level.set(high);
        self.log.push(PinEvent::Level(self.name, high));
    }

    fn set_as_input(&mut self) {
        self.log.push(PinEvent::Input(self.name));
    }

    fn is_high(&mut self) -> bool {
        self.source.as_ref().unwrap_or(&self.level).is_high()
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

impl DelayCycles for NoDelay {
    fn cpu_clock(&self) -> u32 {
        48_000_000
    }

    fn delay_cycles(&mut self, _cycles: u32) {}
}

/// Delay that only adds up how long it was asked to wait.
#[derive(Clone, Default)]
pub struct CountingDelay(Rc<Cell<u64>>);

impl CountingDelay {
    pub fn total_ms(&self) -> u64 {
        self.0.get() / 1_000_000
    }
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + ns as u64);
    }
}

/// A whole board around a [`Bridge`], with every line observable.
pub struct Rig {
    pub log: PinLog,
    pub button: PinHandle,
    pub switch: PinHandle,
    pub clocks: Rc<RefCell<Vec<(bool, bool)>>>,
    pub detaches: Rc<Cell<u32>>,
    pub patterns: Rc<RefCell<Vec<LedPattern>>>,
}

pub type TestBridge<'a> =
    Bridge<'a, MockJtagTransport, FakePin, NoDelay, MockUsbAttach, MockLeds, MockAdc>;

/// ADC value reported by [`Rig::bridge`] boards.
pub const RIG_ADC_READING: u16 = 0x0ABC;

impl Rig {
    pub fn new() -> Self {
        let log = PinLog::default();
        Self {
            button: PinHandle::new(),
            switch: PinHandle::new(),
            log,
            clocks: Default::default(),
            detaches: Default::default(),
            patterns: Default::default(),
        }
    }

    fn hardware(
        &self,
        adc: MockAdc,
    ) -> Hardware<MockJtagTransport, FakePin, NoDelay, MockUsbAttach, MockLeds, MockAdc> {
        let mut jtag = MockJtagTransport::new();
        jtag.expect_init().return_const(());
        jtag.expect_deinit().return_const(());
        jtag.expect_bulk_enable().return_const(());
        jtag.expect_bulk_release().return_const(());
        jtag.expect_bulk_transfer()
            .returning(|tx, rx| rx.copy_from_slice(tx));
        let clocks = self.clocks.clone();
        jtag.expect_clock().returning_st(move |tms, tdi| {
            clocks.borrow_mut().push((tms, tdi));
            tdi
        });

        let mut usb = MockUsbAttach::new();
        let detaches = self.detaches.clone();
        usb.expect_detach()
            .returning_st(move || detaches.set(detaches.get() + 1));
        usb.expect_attach().return_const(());

        let mut leds = MockLeds::new();
        let patterns = self.patterns.clone();
        leds.expect_set_pattern()
            .returning_st(move |pattern| patterns.borrow_mut().push(pattern));

        let mut button = FakePin::new("button", &self.log);
        button.share(&self.button);
        let mut usb_switch = FakePin::new("switch", &self.log);
        usb_switch.share(&self.switch);

        Hardware {
            jtag,
            program: FakePin::new("program", &self.log),
            init: FakePin::new("init", &self.log),
            usb_switch,
            button,
            usb,
            leds,
            adc,
            delay: NoDelay,
        }
    }

    pub fn bridge<'a>(&self, caps: Capabilities, counter: &'a AdvertisementCounter) -> TestBridge<'a> {
        let mut adc = MockAdc::new();
        adc.expect_read().return_const(RIG_ADC_READING);
        let revision = BoardRevision::from_permille(230);
        Bridge::with_capabilities(self.hardware(adc), revision, caps, counter, 0)
    }

    pub fn detected_bridge<'a>(&self, reading: u16, counter: &'a AdvertisementCounter) -> TestBridge<'a> {
        let mut adc = MockAdc::new();
        adc.expect_read().once().return_const(reading);
        Bridge::new(self.hardware(adc), counter, 0)
    }
}
