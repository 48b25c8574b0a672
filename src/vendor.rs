//! Vendor request dispatcher.
//!
//! Every request is a control transfer on endpoint zero. The dispatcher owns no
//! state of its own: it decodes the request and routes it to the JTAG engine,
//! the FPGA lifecycle controller or the port arbiter inside the [`Bridge`].

use crate::{
    board::Adc,
    bridge::Bridge,
    io::{DelayNs, InputOutputPin},
    jtag::{JtagTransport, TapState},
    led::{self, LedPattern, Leds},
    switch::{TakeoverGate, UsbAttach},
    Error, Result, JTAG_BUFFER_SIZE,
};

mod command;
mod request;

use command::DataStage;
pub use command::{Command, ScanFlags};
pub use request::{ControlHandler, Direction, Reply, Request};

/// Identification string returned by [`Command::GetId`].
pub const DEVICE_ID: &[u8] = b"Apollo Debug Module\0";

/// Firmware version string returned by [`Command::GetFirmwareVersion`].
pub const FIRMWARE_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// `(major, minor)` of this vendor request protocol.
pub const USB_API_VERSION: [u8; 2] = [1, 2];

fn check_direction(command: Command, request: &Request) -> Result<()> {
    let expected = match command.data_stage() {
        DataStage::None => return Ok(()),
        DataStage::In => Direction::In,
        DataStage::Out => Direction::Out,
    };

    if request.direction == expected {
        Ok(())
    } else {
        Err(Error::WrongDirection)
    }
}

impl<J, IO, D, A, L, ADC> ControlHandler for Bridge<'_, J, IO, D, A, L, ADC>
where
    J: JtagTransport,
    IO: InputOutputPin,
    D: DelayNs,
    A: UsbAttach,
    L: Leds,
    ADC: Adc,
{
    fn setup(&mut self, request: &Request) -> Result<Reply<'_>> {
        let command = Command::try_from(request.opcode).map_err(|_| Error::UnknownCommand)?;
        trace!("vendor request {:?}", command);
        check_direction(command, request)?;

        match command {
            Command::GetId => Ok(Reply::Slice(DEVICE_ID)),
            Command::SetLedPattern => {
                self.leds.set_pattern(LedPattern::from(request.value));
                Ok(Reply::Ack)
            }
            Command::GetFirmwareVersion => Ok(Reply::Slice(FIRMWARE_VERSION.as_bytes())),
            Command::GetUsbApiVersion => Ok(Reply::pair(USB_API_VERSION)),
            Command::GetAdcReading => Ok(Reply::pair(self.adc.read().to_be_bytes())),

            Command::JtagClearOutBuffer => {
                self.jtag.clear_out_buffer();
                Ok(Reply::Ack)
            }
            Command::JtagSetOutBuffer => match request.length as usize {
                0 => Ok(Reply::Ack),
                n if n > JTAG_BUFFER_SIZE => Err(Error::InvalidLength),
                _ => Ok(Reply::Expect),
            },
            Command::JtagGetInBuffer => {
                let len = (request.length as usize).min(JTAG_BUFFER_SIZE);
                Ok(Reply::Slice(&self.jtag.in_buffer()[..len]))
            }
            Command::JtagScan => {
                let flags = ScanFlags::from_bits_truncate(request.index);
                self.jtag.scan(
                    request.value as usize,
                    flags.contains(ScanFlags::ADVANCE_STATE),
                    flags.contains(ScanFlags::FORCE_BITBANG),
                )?;
                Ok(Reply::Ack)
            }
            Command::JtagRunClock => {
                self.jtag.run_clock(request.value as u32);
                Ok(Reply::Ack)
            }
            Command::JtagGotoState => {
                let state = u8::try_from(request.value)
                    .ok()
                    .and_then(|id| TapState::try_from(id).ok())
                    .ok_or(Error::InvalidState)?;
                self.jtag.go_to_state(state);
                Ok(Reply::Ack)
            }
            Command::JtagGetState => Ok(Reply::byte(self.jtag.current_state().into())),
            Command::JtagStop => {
                self.leds.set_pattern(LedPattern::Blink(led::IDLE));
                self.jtag.deinit();
                Ok(Reply::Ack)
            }
            Command::JtagStart => {
                self.leds.set_pattern(LedPattern::Blink(led::JTAG_CONNECTED));
                self.jtag.init();
                Ok(Reply::Ack)
            }

            Command::TriggerReconfiguration => {
                self.fpga
                    .trigger_reconfiguration(&mut self.jtag, &mut self.delay);
                Ok(Reply::Ack)
            }
            Command::ForceFpgaOffline => {
                self.fpga.force_offline(&mut self.jtag, &mut self.switch);
                Ok(Reply::Ack)
            }
            // Takes effect in `finish`, once the host has seen the transfer complete.
            Command::AllowFpgaTakeoverUsb => Ok(Reply::Ack),
        }
    }

    fn data(&mut self, request: &Request, data: &[u8]) -> Result<()> {
        match Command::try_from(request.opcode) {
            Ok(Command::JtagSetOutBuffer) => self.jtag.set_out_buffer(data),
            _ => Ok(()),
        }
    }

    fn finish(&mut self, request: &Request) {
        if let Ok(Command::AllowFpgaTakeoverUsb) = Command::try_from(request.opcode) {
            self.switch.allow_fpga_takeover_usb(true);
        }
    }
}
