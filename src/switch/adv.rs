//! FPGA port advertisement.
//!
//! [`AdvertisementCounter`] is the only state touched from interrupt context.
//! The interrupt side is its single writer and only ever stores forward, so no
//! critical section is needed: stores are `Release`, task-side loads `Acquire`.
//! [`Advertisement`] is the task side and turns the raw counter into a
//! windowed, level-sensitive request.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::board::AdvertisementKind;
use crate::io::{elapsed, Millis};

/// Length of one edge-counting window.
pub const WINDOW_MS: Millis = 200;
/// A window with more edges than this is a port request.
pub const EDGE_THRESHOLD: u32 = 2;
/// Windows in a row above threshold before a request is acted on.
pub const STABLE_WINDOWS: u8 = 2;
/// A serial beacon keeps the request alive this long.
pub const BEACON_TIMEOUT_MS: Millis = 100;

/// Byte the FPGA repeats on serial-advertisement boards.
const BEACON: u8 = b'A';

/// Raw advertisement activity, written from interrupt handlers.
pub struct AdvertisementCounter {
    edges: AtomicU32,
    last_beacon: AtomicU32,
    beacon_seen: AtomicBool,
}

impl AdvertisementCounter {
    /// A counter with no activity recorded. Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            edges: AtomicU32::new(0),
            last_beacon: AtomicU32::new(0),
            beacon_seen: AtomicBool::new(false),
        }
    }

    /// Record one edge on the advertisement line. Call from the pin interrupt.
    #[inline]
    pub fn on_edge(&self) {
        // Single writer: a plain load/store pair cannot lose an increment and
        // works on cores without atomic read-modify-write.
        let edges = self.edges.load(Ordering::Relaxed);
        self.edges.store(edges.wrapping_add(1), Ordering::Release);
    }

    /// Record one byte from the advertisement UART. Call from its receive interrupt.
    pub fn on_serial_byte(&self, byte: u8, parity_error: bool, now: Millis) {
        if parity_error || byte != BEACON {
            return;
        }
        self.last_beacon.store(now, Ordering::Relaxed);
        self.beacon_seen.store(true, Ordering::Release);
    }

    fn edges(&self) -> u32 {
        self.edges.load(Ordering::Acquire)
    }

    fn last_beacon(&self) -> Option<Millis> {
        self.beacon_seen
            .load(Ordering::Acquire)
            .then(|| self.last_beacon.load(Ordering::Relaxed))
    }
}

impl Default for AdvertisementCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Task-side view of the FPGA's port requests.
///
/// Only [`Self::task`] looks at the live counter; the query methods answer
/// from the last evaluated window.
pub struct Advertisement<'a> {
    counter: &'a AdvertisementCounter,
    kind: AdvertisementKind,
    window_start: Millis,
    edges_at_start: u32,
    window_edges: u32,
    consecutive: u8,
    requested: bool,
    evaluated: bool,
}

impl<'a> Advertisement<'a> {
    /// Start observing `counter`. The first window opens at `now`.
    pub fn new(counter: &'a AdvertisementCounter, kind: AdvertisementKind, now: Millis) -> Self {
        Self {
            counter,
            kind,
            window_start: now,
            edges_at_start: counter.edges(),
            window_edges: 0,
            consecutive: 0,
            requested: false,
            evaluated: false,
        }
    }

    /// Signalling method this board uses.
    pub fn kind(&self) -> AdvertisementKind {
        self.kind
    }

    /// Re-evaluate the request. Call once per loop iteration.
    pub fn task(&mut self, now: Millis) {
        match self.kind {
            AdvertisementKind::None => {}
            AdvertisementKind::Edges => {
                if elapsed(now, self.window_start) < WINDOW_MS {
                    return;
                }
                let edges = self.counter.edges();
                self.window_edges = edges.wrapping_sub(self.edges_at_start);
                self.edges_at_start = edges;
                self.window_start = now;

                self.requested = self.window_edges > EDGE_THRESHOLD;
                self.evaluated = true;
                self.consecutive = if self.requested {
                    self.consecutive.saturating_add(1)
                } else {
                    0
                };
                trace!("advertisement window: {} edges", self.window_edges);
            }
            AdvertisementKind::Serial => {
                self.requested = self
                    .counter
                    .last_beacon()
                    .is_some_and(|last| elapsed(now, last) < BEACON_TIMEOUT_MS);
                // Silence only counts once a whole timeout has passed.
                self.evaluated |=
                    self.requested || elapsed(now, self.window_start) >= BEACON_TIMEOUT_MS;
            }
        }
    }

    /// False until the first window has closed; nothing is known before.
    pub fn has_verdict(&self) -> bool {
        self.evaluated
    }

    /// True if the FPGA asked for the port in the last evaluated window.
    pub fn requesting_port(&self) -> bool {
        self.requested
    }

    /// True once the request has held long enough to act on.
    pub fn request_is_stable(&self) -> bool {
        match self.kind {
            AdvertisementKind::Edges => self.consecutive >= STABLE_WINDOWS,
            _ => self.requested,
        }
    }

    /// Edges counted in the last completed window.
    pub fn window_edges(&self) -> u32 {
        self.window_edges
    }
}
