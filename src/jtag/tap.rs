use num_enum::{IntoPrimitive, TryFromPrimitive};

/// States of the JTAG TAP controller.
///
/// The discriminants are the state ids used on the wire by the goto-state and
/// get-state requests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TapState {
    TestLogicReset = 0,
    RunTestIdle = 1,
    SelectDrScan = 2,
    CaptureDr = 3,
    ShiftDr = 4,
    Exit1Dr = 5,
    PauseDr = 6,
    Exit2Dr = 7,
    UpdateDr = 8,
    SelectIrScan = 9,
    CaptureIr = 10,
    ShiftIr = 11,
    Exit1Ir = 12,
    PauseIr = 13,
    Exit2Ir = 14,
    UpdateIr = 15,
}

const STATE_COUNT: usize = 16;

impl TapState {
    /// The state reached after one TCK edge with the given TMS level.
    pub const fn next(self, tms: bool) -> Self {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, false) => RunTestIdle,
            (TestLogicReset, true) => TestLogicReset,
            (RunTestIdle, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,

            (SelectDrScan, false) => CaptureDr,
            (SelectDrScan, true) => SelectIrScan,
            (CaptureDr, false) | (ShiftDr, false) | (Exit2Dr, false) => ShiftDr,
            (CaptureDr, true) | (ShiftDr, true) => Exit1Dr,
            (Exit1Dr, false) | (PauseDr, false) => PauseDr,
            (Exit1Dr, true) | (Exit2Dr, true) => UpdateDr,
            (PauseDr, true) => Exit2Dr,
            (UpdateDr, false) | (UpdateIr, false) => RunTestIdle,
            (UpdateDr, true) | (UpdateIr, true) => SelectDrScan,

            (SelectIrScan, false) => CaptureIr,
            (SelectIrScan, true) => TestLogicReset,
            (CaptureIr, false) | (ShiftIr, false) | (Exit2Ir, false) => ShiftIr,
            (CaptureIr, true) | (ShiftIr, true) => Exit1Ir,
            (Exit1Ir, false) | (PauseIr, false) => PauseIr,
            (Exit1Ir, true) | (Exit2Ir, true) => UpdateIr,
            (PauseIr, true) => Exit2Ir,
        }
    }
}

/// A sequence of TMS levels, applied LSB first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TmsPath {
    bits: u16,
    len: u8,
}

impl TmsPath {
    /// Five TMS-high clocks reach Test-Logic-Reset from any state.
    pub const RESET: Self = Self {
        bits: 0b1_1111,
        len: 5,
    };

    /// Shortest TMS sequence that moves the TAP from `from` to `to`.
    ///
    /// Empty when both states are equal.
    pub fn between(from: TapState, to: TapState) -> Self {
        // Breadth-first search over the 16-node TAP graph; the first time a
        // state is discovered is along a shortest path.
        let mut parent: [Option<(TapState, bool)>; STATE_COUNT] = [None; STATE_COUNT];
        let mut queue = [from; STATE_COUNT];
        let mut seen = 1u16 << u8::from(from);
        let (mut head, mut tail) = (0, 1);

        while head < tail {
            let state = queue[head];
            head += 1;
            if state == to {
                break;
            }
            for tms in [false, true] {
                let next = state.next(tms);
                let bit = 1u16 << u8::from(next);
                if seen & bit == 0 {
                    seen |= bit;
                    parent[u8::from(next) as usize] = Some((state, tms));
                    queue[tail] = next;
                    tail += 1;
                }
            }
        }

        let mut path = Self { bits: 0, len: 0 };
        let mut state = to;
        while state != from {
            let Some((prev, tms)) = parent[u8::from(state) as usize] else {
                break;
            };
            path.bits = (path.bits << 1) | tms as u16;
            path.len += 1;
            state = prev;
        }
        path
    }

    /// Number of clocks in the path.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True when no clocks are needed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// TMS levels in the order they must be clocked.
    pub fn iter(&self) -> impl Iterator<Item = bool> {
        let bits = self.bits;
        (0..self.len).map(move |i| bits & (1 << i) != 0)
    }
}
