#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//! Control plane of a USB-attached FPGA debug bridge.
//!
//! The bridge configures and debugs an FPGA over JTAG, and shares a single USB
//! port in time between its own microcontroller and the FPGA. Hardware is
//! reached only through the traits in [`io`], [`jtag`], [`board`], [`switch`]
//! and [`led`]; everything is driven from one cooperative loop calling
//! [`bridge::Bridge::task`].

#[macro_use]
mod fmt;

pub mod board;
pub mod bridge;
pub mod button;
pub mod driver;
pub mod fpga;
pub mod io;
pub mod jtag;
pub mod led;
pub mod switch;
pub mod usb;
pub mod vendor;

#[cfg(test)]
mod mock_device;

/// Capacity of each of the JTAG in/out scan buffers, in bytes.
pub const JTAG_BUFFER_SIZE: usize = 256;

/// Errors surfaced by the bridge core.
///
/// Any of these stalls the control transfer that caused it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Zero-length scan, oversized buffer write or similar.
    InvalidLength,
    /// A parameter named a state or value that does not exist.
    InvalidState,
    /// The opcode is not part of the command surface.
    UnknownCommand,
    /// The request direction does not match what the command transfers.
    WrongDirection,
}

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
