//! HID boot-protocol mouse driver.
//!
//! Report-descriptor parsing is out of scope; the interface is forced into
//! the boot protocol, whose mouse report layout is fixed: button bitmask,
//! then two's-complement X, Y and wheel deltas.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::class::{ClassDriver, DriverError, DriverProperties, Result};
use crate::endpoint::{translate, EndpointInfo, EpDirection, LinkSpeed};
use crate::enumerate::InterfaceTree;
use crate::transport::{DeviceReqData, HostTransport, ReqRecipient, ReqTy};
use crate::usb::class_code;

const SET_IDLE: u8 = 0x0A;
const SET_PROTOCOL: u8 = 0x0B;
const BOOT_PROTOCOL: u16 = 0;

/// Buttons + X + Y + wheel.
const MIN_REPORT_LEN: u16 = 4;
const BUTTON_COUNT: u8 = 5;

const POLL_STEP_MS: u32 = 100;

const BUTTON_NAMES: [&str; BUTTON_COUNT as usize] =
    ["left", "right", "middle", "side", "extra"];

pub struct HidMouse {
    interface_num: u8,
    int_in: EndpointInfo,
    prev_buttons: u8,
}

impl HidMouse {
    /// Selects the first interrupt-in endpoint; its packet size must cover
    /// a full boot mouse report.
    pub fn bind(
        iface: &InterfaceTree,
        usb_version: u16,
        speed: LinkSpeed,
    ) -> Result<(Self, Vec<EndpointInfo>)> {
        let int_in = iface
            .endpoints
            .iter()
            .map(|(desc, companion)| translate(desc, companion.as_ref(), usb_version, speed))
            .find(|info| info.ty.is_interrupt() && info.direction == EpDirection::In)
            .ok_or(DriverError::Protocol("no interrupt-in endpoint"))?;

        if int_in.max_packet_size < MIN_REPORT_LEN {
            return Err(DriverError::Protocol("interrupt endpoint too small for a boot report"));
        }

        Ok((
            Self {
                interface_num: iface.desc.number,
                int_in,
                prev_buttons: 0,
            },
            vec![int_in],
        ))
    }

    fn decode_report(&mut self, report: &[u8]) {
        let buttons = report[0];
        let dx = report[1] as i8;
        let dy = report[2] as i8;
        let wheel = if report.len() > 3 { report[3] as i8 } else { 0 };

        let edges = buttons ^ self.prev_buttons;
        for bit in 0..BUTTON_COUNT {
            if edges & (1 << bit) != 0 {
                let pressed = buttons & (1 << bit) != 0;
                info!(
                    "mouse button {}: {}",
                    BUTTON_NAMES[usize::from(bit)],
                    if pressed { "pressed" } else { "released" }
                );
            }
        }
        self.prev_buttons = buttons;

        if dx != 0 || dy != 0 || wheel != 0 {
            debug!("mouse motion dx={} dy={} wheel={}", dx, dy, wheel);
        }
    }

    /// Poll loop. One receive transfer is kept outstanding and resubmitted
    /// after each report until the stop flag is raised or the time budget
    /// runs out; outstanding transfers are cancelled on the way out.
    pub fn poll(
        &mut self,
        xfer: &mut dyn HostTransport,
        stop: &AtomicBool,
        budget: Option<Duration>,
    ) -> Result<()> {
        let started = Instant::now();
        let report_len = usize::from(self.int_in.max_packet_size);
        let ep = self.int_in.ep_num;
        let mut in_flight = false;

        let result = loop {
            if stop.load(Ordering::Relaxed) {
                break Ok(());
            }
            if let Some(budget) = budget {
                if started.elapsed() >= budget {
                    break Ok(());
                }
            }

            if !in_flight {
                if let Err(e) = xfer.submit_in(ep, vec![0u8; report_len]) {
                    break Err(e.into());
                }
                in_flight = true;
            }

            match xfer.wait(ep, EpDirection::In, POLL_STEP_MS) {
                Ok(None) => continue,
                Ok(Some(transfer)) => {
                    in_flight = false;
                    if !transfer.code.has_data() {
                        break Err(DriverError::Hardware(transfer.code));
                    }
                    let got = transfer.bytes as usize;
                    if got < MIN_REPORT_LEN as usize - 1 {
                        trace!("short mouse report ({} bytes), skipped", got);
                        continue;
                    }
                    self.decode_report(&transfer.buffer[..got]);
                }
                Err(e) => break Err(e.into()),
            }
        };

        if in_flight {
            match xfer.cancel(ep, EpDirection::In) {
                Ok(n) => debug!("mouse poll drained {} transfers", n),
                Err(e) => warn!("mouse poll drain failed: {}", e),
            }
        }
        result
    }
}

impl ClassDriver for HidMouse {
    fn init(&mut self, xfer: &mut dyn HostTransport) -> Result<()> {
        xfer.device_request(
            ReqTy::Class,
            ReqRecipient::Interface,
            SET_PROTOCOL,
            BOOT_PROTOCOL,
            u16::from(self.interface_num),
            DeviceReqData::NoData,
        )?;
        // Infinite idle rate: reports only on state change.
        if let Err(e) = xfer.device_request(
            ReqTy::Class,
            ReqRecipient::Interface,
            SET_IDLE,
            0,
            u16::from(self.interface_num),
            DeviceReqData::NoData,
        ) {
            debug!("set idle rejected ({}), continuing", e);
        }
        Ok(())
    }

    fn print_info(&self) {
        info!(
            "boot mouse on endpoint {} ({} byte reports)",
            self.int_in.ep_num, self.int_in.max_packet_size
        );
    }

    fn properties(&self) -> DriverProperties {
        DriverProperties {
            name: "hid-mouse",
            interface_class: class_code::HID,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mouse(prev: u8) -> HidMouse {
        HidMouse {
            interface_num: 0,
            int_in: EndpointInfo {
                ep_num: 1,
                direction: EpDirection::In,
                ty: crate::endpoint::EndpointType::InterruptIn,
                sync_ty: 0,
                usage_ty: 0,
                max_packet_size: 8,
                interval: 3,
                max_burst: 0,
                max_streams: 0,
                mult: 0,
                bytes_per_interval: 0,
            },
            prev_buttons: prev,
        }
    }

    #[test]
    fn button_edges_update_state() {
        let mut m = mouse(0b00001);
        // Left released, right pressed.
        m.decode_report(&[0b00010, 0, 0, 0]);
        assert_eq!(m.prev_buttons, 0b00010);
        // Unchanged report leaves state alone.
        m.decode_report(&[0b00010, 5, 0xFB, 1]);
        assert_eq!(m.prev_buttons, 0b00010);
    }
}
