//! `usb-device` glue for the vendor request protocol.
//!
//! [`VendorClass`] claims one vendor-specific interface and forwards vendor
//! requests addressed to the device to a [`ControlHandler`].

use usb_device::class_prelude::*;
use usb_device::control::{self, RequestType};
use usb_device::UsbDirection;

use crate::vendor::{ControlHandler, Direction, Reply, Request};

const INTERFACE_CLASS_VENDOR: u8 = 0xFF;

fn decode(request: &control::Request) -> Option<Request> {
    if request.request_type != RequestType::Vendor {
        return None;
    }

    Some(Request {
        opcode: request.request,
        direction: match request.direction {
            UsbDirection::In => Direction::In,
            UsbDirection::Out => Direction::Out,
        },
        value: request.value,
        index: request.index,
        length: request.length,
    })
}

/// An accepted request waiting for its status stage.
#[derive(Copy, Clone)]
struct Pending {
    request: Request,
    // Set by the poll that ends the `UsbDevice::poll` which accepted it.
    armed: bool,
}

impl Pending {
    fn new(request: Request) -> Self {
        Pending {
            request,
            armed: false,
        }
    }
}

/// USB class serving the bridge's vendor requests.
///
/// usb-device reports no status-stage completion to classes. It does poll
/// classes after every endpoint event, and the first event after the one that
/// accepted a request is the end of the transfer. The finish phase runs on
/// that poll, unless another setup packet arrives first.
pub struct VendorClass<H> {
    interface: InterfaceNumber,
    handler: H,
    pending: Option<Pending>,
}

impl<H: ControlHandler> VendorClass<H> {
    /// Allocate the interface and wrap `handler`.
    pub fn new<B: UsbBus>(alloc: &UsbBusAllocator<B>, handler: H) -> Self {
        VendorClass {
            interface: alloc.interface(),
            handler,
            pending: None,
        }
    }

    /// The wrapped handler.
    pub fn handler(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<B: UsbBus, H: ControlHandler> UsbClass<B> for VendorClass<H> {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> usb_device::Result<()> {
        writer.interface(self.interface, INTERFACE_CLASS_VENDOR, 0, 0)
    }

    fn reset(&mut self) {
        self.pending = None;
    }

    fn poll(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if !pending.armed {
            pending.armed = true;
            return;
        }

        let request = pending.request;
        self.pending = None;
        self.handler.finish(&request);
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        // A new setup packet means the previous transfer is over or abandoned.
        self.pending = None;
        let Some(request) = decode(xfer.request()) else {
            return;
        };

        match self.handler.setup(&request) {
            Ok(reply) => {
                if xfer.accept_with(reply.data()).is_ok() {
                    self.pending = Some(Pending::new(request));
                }
            }
            Err(_e) => {
                debug!("vendor request {:#x} stalled: {:?}", request.opcode, _e);
                let _ = xfer.reject();
            }
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        self.pending = None;
        let Some(request) = decode(xfer.request()) else {
            return;
        };

        let result = self
            .handler
            .setup(&request)
            .map(|reply| reply == Reply::Expect)
            .and_then(|expect| {
                if expect {
                    self.handler.data(&request, xfer.data())
                } else {
                    Ok(())
                }
            });

        match result {
            Ok(()) => {
                if xfer.accept().is_ok() {
                    self.pending = Some(Pending::new(request));
                }
            }
            Err(_e) => {
                debug!("vendor request {:#x} stalled: {:?}", request.opcode, _e);
                let _ = xfer.reject();
            }
        }
    }
}
