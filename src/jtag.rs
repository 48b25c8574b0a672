//! JTAG transport engine.
//!
//! Owns the TAP state and the host-visible in/out scan buffers, and turns a
//! scan of arbitrary bit length into an accelerated whole-byte bulk segment
//! followed by a bit-serial tail that can resolve a TAP state change on the
//! final bit.

use crate::{Error, Result, JTAG_BUFFER_SIZE};

mod tap;

pub use tap::{TapState, TmsPath};

/// Physical side of the JTAG link.
///
/// `clock` is the direct-pin path; `bulk_*` is the accelerated byte path
/// (typically a SPI peripheral sharing the TCK/TDI/TDO lines). Bulk transfers
/// always shift with TMS held low.
#[cfg_attr(test, mockall::automock)]
pub trait JtagTransport {
    /// Configure the lines for JTAG use.
    fn init(&mut self);
    /// Give the lines back to their shared function (e.g. UART).
    fn deinit(&mut self);
    /// Present `tms`/`tdi`, pulse TCK once and return the sampled TDO.
    fn clock(&mut self, tms: bool, tdi: bool) -> bool;
    /// Hand the lines to the accelerated channel.
    fn bulk_enable(&mut self);
    /// Shift whole bytes LSB first, capturing TDO into `rx`.
    fn bulk_transfer(&mut self, tx: &[u8], rx: &mut [u8]);
    /// Return the lines to direct-pin control.
    fn bulk_release(&mut self);
}

/// How a scan is split between the bulk channel and the bit-serial tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanPlan {
    /// Whole bytes sent over the accelerated channel.
    pub bulk_bytes: usize,
    /// Bits sent one at a time after the bulk segment.
    pub slow_bits: usize,
}

impl ScanPlan {
    /// Plan a scan of `bit_count` bits against buffers of `capacity` bytes.
    pub fn new(bit_count: usize, advance_state: bool, force_bitbang: bool, capacity: usize) -> Result<Self> {
        if bit_count == 0 || bit_count.div_ceil(8) > capacity {
            return Err(Error::InvalidLength);
        }

        let mut plan = if force_bitbang {
            Self {
                bulk_bytes: 0,
                slow_bits: bit_count,
            }
        } else {
            Self {
                bulk_bytes: bit_count / 8,
                slow_bits: bit_count % 8,
            }
        };

        // The TAP only advances on the last bit if that bit goes out on the
        // bit-serial path.
        if advance_state && plan.slow_bits == 0 {
            plan.bulk_bytes -= 1;
            plan.slow_bits = 8;
        }

        Ok(plan)
    }
}

/// TAP-level access: clocks and state tracking, without the scan buffers.
struct Tap<T> {
    transport: T,
    state: TapState,
    last_tms: bool,
}

impl<T: JtagTransport> Tap<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            state: TapState::TestLogicReset,
            last_tms: true,
        }
    }

    #[inline(always)]
    fn clock(&mut self, tms: bool, tdi: bool) -> bool {
        let tdo = self.transport.clock(tms, tdi);
        self.state = self.state.next(tms);
        self.last_tms = tms;
        tdo
    }

    fn follow(&mut self, path: TmsPath) {
        for tms in path.iter() {
            self.clock(tms, false);
        }
    }

    /// Shift `n_bits` from `tdi` (LSB first) while capturing into `tdo`.
    ///
    /// With `advance_state`, TMS is raised on the last bit so the TAP leaves
    /// the shift state.
    fn shift(&mut self, tdi: &[u8], tdo: &mut [u8], n_bits: usize, advance_state: bool) {
        for bit in 0..n_bits {
            let (byte, mask) = (bit / 8, 1u8 << (bit % 8));
            let tms = advance_state && bit == n_bits - 1;
            let out = tdi.get(byte).is_some_and(|b| b & mask != 0);

            let sampled = self.clock(tms, out);
            if let Some(b) = tdo.get_mut(byte) {
                if sampled {
                    *b |= mask;
                } else {
                    *b &= !mask;
                }
            }
        }
    }
}

/// The JTAG transport engine.
pub struct Jtag<T> {
    tap: Tap<T>,
    out_buffer: [u8; JTAG_BUFFER_SIZE],
    in_buffer: [u8; JTAG_BUFFER_SIZE],
    sessions: u8,
}

impl<T: JtagTransport> Jtag<T> {
    /// Create an engine around `transport`. Lines are left untouched until
    /// [`Self::init`].
    pub fn new(transport: T) -> Self {
        Self {
            tap: Tap::new(transport),
            out_buffer: [0; JTAG_BUFFER_SIZE],
            in_buffer: [0; JTAG_BUFFER_SIZE],
            sessions: 0,
        }
    }

    /// Open a JTAG session.
    ///
    /// Sessions nest: only the outermost call configures the lines and resets
    /// the TAP, so an internal sequence can run inside a host session.
    pub fn init(&mut self) {
        self.sessions = self.sessions.saturating_add(1);
        if self.sessions == 1 {
            info!("JTAG session start");
            self.tap.transport.init();
            self.tap.follow(TmsPath::RESET);
        }
    }

    /// Close a JTAG session; the outermost close releases the lines.
    pub fn deinit(&mut self) {
        match self.sessions {
            0 => warn!("JTAG deinit without a session"),
            1 => {
                self.sessions = 0;
                self.tap.transport.deinit();
                info!("JTAG session stop");
            }
            _ => self.sessions -= 1,
        }
    }

    /// True while at least one session is open.
    pub fn is_active(&self) -> bool {
        self.sessions > 0
    }

    /// Scan `bit_count` bits from the out buffer, capturing into the in buffer.
    pub fn scan(&mut self, bit_count: usize, advance_state: bool, force_bitbang: bool) -> Result<()> {
        let plan = ScanPlan::new(bit_count, advance_state, force_bitbang, JTAG_BUFFER_SIZE)?;
        trace!(
            "scan {} bits: {} bulk bytes, {} slow bits",
            bit_count,
            plan.bulk_bytes,
            plan.slow_bits
        );

        let bulk = plan.bulk_bytes;
        if bulk > 0 {
            self.tap.transport.bulk_enable();
            self.tap
                .transport
                .bulk_transfer(&self.out_buffer[..bulk], &mut self.in_buffer[..bulk]);
            self.tap.last_tms = false;
        }
        self.tap.transport.bulk_release();

        if plan.slow_bits > 0 {
            self.tap.shift(
                &self.out_buffer[bulk..],
                &mut self.in_buffer[bulk..],
                plan.slow_bits,
                advance_state,
            );
        }

        Ok(())
    }

    /// Bit-serial shift from caller-provided buffers, leaving the host buffers alone.
    pub fn shift(&mut self, tdi: &[u8], tdo: &mut [u8], n_bits: usize, advance_state: bool) {
        self.tap.shift(tdi, tdo, n_bits, advance_state);
    }

    /// Drive the TAP to `target` over the shortest TMS path.
    ///
    /// Test-Logic-Reset is always reached with five TMS-high clocks, whatever
    /// the tracked state.
    pub fn go_to_state(&mut self, target: TapState) {
        let path = if target == TapState::TestLogicReset {
            TmsPath::RESET
        } else {
            TmsPath::between(self.tap.state, target)
        };
        self.tap.follow(path);
        debug!("TAP now in {:?}", self.tap.state);
    }

    /// Pulse TCK `cycles` times, keeping TMS at its last level.
    pub fn run_clock(&mut self, cycles: u32) {
        let tms = self.tap.last_tms;
        for _ in 0..cycles {
            self.tap.clock(tms, false);
        }
    }

    /// Last known TAP state.
    pub fn current_state(&self) -> TapState {
        self.tap.state
    }

    /// Zero the out buffer.
    pub fn clear_out_buffer(&mut self) {
        self.out_buffer.fill(0);
    }

    /// Copy `data` to the start of the out buffer.
    pub fn set_out_buffer(&mut self, data: &[u8]) -> Result<()> {
        let dst = self.out_buffer.get_mut(..data.len()).ok_or(Error::InvalidLength)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Data captured by the last scan.
    pub fn in_buffer(&self) -> &[u8; JTAG_BUFFER_SIZE] {
        &self.in_buffer
    }

    /// Access the underlying transport.
    pub fn transport(&mut self) -> &mut T {
        &mut self.tap.transport
    }
}
