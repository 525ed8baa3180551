//! Hub class driver for both USB 2.0 and SuperSpeed hubs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::class::{ClassDriver, DriverError, DriverProperties, Result};
use crate::endpoint::{translate, EndpointInfo, EpDirection, LinkSpeed};
use crate::enumerate::InterfaceTree;
use crate::transport::HostTransport;
use crate::usb::hub::{
    HubDescriptorV2, HubDescriptorV3, HubPortFeature, HubPortStatus, HubPortStatusV2,
    HubPortStatusV3,
};
use crate::usb::class_code;

const POLL_STEP_MS: u32 = 100;
/// 10 ms slices while a port reset is in progress.
const RESET_POLL_MS: u64 = 10;
const RESET_POLL_ATTEMPTS: u32 = 50;

pub struct Hub {
    int_in: EndpointInfo,
    usb3: bool,
    ports: u8,
    power_on_delay_ms: u64,
}

impl Hub {
    /// Requires exactly one interrupt-in endpoint (the status-change pipe)
    /// and reads the class hub descriptor up front so the transport can size
    /// the device context for the port count.
    pub fn bind(
        xfer: &mut dyn HostTransport,
        iface: &InterfaceTree,
        usb_version: u16,
        speed: LinkSpeed,
    ) -> Result<(Self, Vec<EndpointInfo>)> {
        let interrupt_in: Vec<EndpointInfo> = iface
            .endpoints
            .iter()
            .map(|(desc, companion)| translate(desc, companion.as_ref(), usb_version, speed))
            .filter(|info| info.ty.is_interrupt() && info.direction == EpDirection::In)
            .collect();
        let int_in = match interrupt_in.as_slice() {
            [] => return Err(DriverError::Protocol("hub has no status-change endpoint")),
            [one] => *one,
            [first, ..] => {
                warn!("hub exposes {} interrupt-in endpoints, using the first", interrupt_in.len());
                *first
            }
        };

        let usb3 = speed.is_super();
        let (ports, power_on_delay_ms) = if usb3 {
            let mut buf = [0u8; 12];
            xfer.hub_descriptor(HubDescriptorV3::DESCRIPTOR_KIND, &mut buf)?;
            let desc = HubDescriptorV3::parse(&buf)?;
            (desc.ports, desc.power_on_delay_ms())
        } else {
            let mut buf = [0u8; 16];
            xfer.hub_descriptor(HubDescriptorV2::DESCRIPTOR_KIND, &mut buf)?;
            let desc = HubDescriptorV2::parse(&buf)?;
            (desc.ports, desc.power_on_delay_ms())
        };
        if ports == 0 {
            return Err(DriverError::Protocol("hub reports zero ports"));
        }

        Ok((
            Self {
                int_in,
                usb3,
                ports,
                power_on_delay_ms,
            },
            vec![int_in],
        ))
    }

    pub fn ports(&self) -> u8 {
        self.ports
    }

    /// Tiers below the root, 4 bits of route string per tier.
    fn depth(route_string: u32) -> u8 {
        let mut depth = 0;
        let mut route = route_string;
        while route != 0 {
            depth += 1;
            route >>= 4;
        }
        depth
    }

    fn port_status(&self, xfer: &mut dyn HostTransport, port: u8) -> Result<HubPortStatus> {
        Ok(xfer.port_status(port, self.usb3)?)
    }

    /// Clears every change bit the status word reports as set, so the next
    /// status-change interrupt reflects only new events.
    fn clear_changes(
        &self,
        xfer: &mut dyn HostTransport,
        port: u8,
        status: HubPortStatus,
    ) -> Result<()> {
        let features = match status {
            HubPortStatus::V2(s) => [
                (s.contains(HubPortStatusV2::CONNECTION_CHANGED), HubPortFeature::CPortConnection),
                (s.contains(HubPortStatusV2::ENABLE_CHANGED), HubPortFeature::CPortEnable),
                (s.contains(HubPortStatusV2::SUSPEND_CHANGED), HubPortFeature::CPortSuspend),
                (s.contains(HubPortStatusV2::OVER_CURRENT_CHANGED), HubPortFeature::CPortOverCurrent),
                (s.contains(HubPortStatusV2::RESET_CHANGED), HubPortFeature::CPortReset),
            ],
            HubPortStatus::V3(s) => [
                (s.contains(HubPortStatusV3::CONNECTION_CHANGED), HubPortFeature::CPortConnection),
                (false, HubPortFeature::CPortEnable),
                (false, HubPortFeature::CPortSuspend),
                (s.contains(HubPortStatusV3::OVER_CURRENT_CHANGED), HubPortFeature::CPortOverCurrent),
                (s.contains(HubPortStatusV3::RESET_CHANGED), HubPortFeature::CPortReset),
            ],
        };
        for (changed, feature) in features {
            if changed {
                xfer.clear_port_feature(port, feature)?;
            }
        }
        Ok(())
    }

    /// Powers, resets and waits for the port to come up enabled, then infers
    /// the downstream device's link speed from the port status bits.
    pub fn reset_port(&mut self, xfer: &mut dyn HostTransport, port: u8) -> Result<LinkSpeed> {
        if port == 0 || port > self.ports {
            return Err(DriverError::InvalidParam("port number out of range"));
        }

        if !self.port_status(xfer, port)?.is_powered() {
            xfer.set_port_feature(port, HubPortFeature::PortPower, 0)?;
            thread::sleep(Duration::from_millis(self.power_on_delay_ms));
        }

        xfer.set_port_feature(port, HubPortFeature::PortReset, 0)?;
        let mut status = self.port_status(xfer, port)?;
        let mut attempts = 0;
        while status.is_resetting() {
            attempts += 1;
            if attempts > RESET_POLL_ATTEMPTS {
                return Err(DriverError::Protocol("port reset did not complete"));
            }
            thread::sleep(Duration::from_millis(RESET_POLL_MS));
            status = self.port_status(xfer, port)?;
        }
        self.clear_changes(xfer, port, status)?;

        if !status.is_connected() {
            return Err(DriverError::Protocol("no device connected after port reset"));
        }
        if !status.is_enabled() {
            return Err(DriverError::Protocol("port not enabled after reset"));
        }

        let speed = match status {
            // A device enabled behind a SuperSpeed hub runs at SuperSpeed;
            // slower devices are routed to the hub's USB 2.0 half instead.
            HubPortStatus::V3(_) => LinkSpeed::Super,
            HubPortStatus::V2(s) => {
                if s.contains(HubPortStatusV2::LOW_SPEED) {
                    LinkSpeed::Low
                } else if s.contains(HubPortStatusV2::HIGH_SPEED) {
                    LinkSpeed::High
                } else {
                    LinkSpeed::Full
                }
            }
        };
        info!("hub port {} reset complete, {} device", port, speed.as_str());
        Ok(speed)
    }

    /// Status-change polling loop. One interrupt transfer sized to the port
    /// bitmap stays outstanding; each completion is decoded per port and the
    /// handled change features cleared.
    pub fn read_hub(
        &mut self,
        xfer: &mut dyn HostTransport,
        stop: &AtomicBool,
        budget: Option<Duration>,
    ) -> Result<()> {
        let started = Instant::now();
        let bitmap_len = (usize::from(self.ports) + 1 + 7) / 8;
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
                if let Err(e) = xfer.submit_in(ep, vec![0u8; bitmap_len]) {
                    break Err(e.into());
                }
                in_flight = true;
            }

            let transfer = match xfer.wait(ep, EpDirection::In, POLL_STEP_MS) {
                Ok(None) => continue,
                Ok(Some(t)) => t,
                Err(e) => break Err(e.into()),
            };
            in_flight = false;
            if !transfer.code.has_data() {
                break Err(DriverError::Hardware(transfer.code));
            }

            let bitmap = &transfer.buffer[..(transfer.bytes as usize).min(bitmap_len)];
            for port in 1..=self.ports {
                let byte = usize::from(port) / 8;
                let bit = port % 8;
                if byte >= bitmap.len() || bitmap[byte] & (1 << bit) == 0 {
                    continue;
                }
                trace!("hub port {} signalled a change", port);
                let status = match self.port_status(xfer, port) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("hub port {}: status read failed: {}", port, e);
                        continue;
                    }
                };
                if status.connection_changed() {
                    if status.is_connected() {
                        info!("hub port {}: device connected", port);
                    } else {
                        info!("hub port {}: device disconnected", port);
                    }
                }
                if let Err(e) = self.clear_changes(xfer, port, status) {
                    warn!("hub port {}: clearing change bits failed: {}", port, e);
                }
            }
        };

        if in_flight {
            match xfer.cancel(ep, EpDirection::In) {
                Ok(n) => debug!("hub poll drained {} transfers", n),
                Err(e) => warn!("hub poll drain failed: {}", e),
            }
        }
        result
    }

    /// Puts the hub into a USB 2.0 electrical test mode. All ports are
    /// suspended first; leaving test mode requires an external hub reset.
    pub fn enable_test_mode(&mut self, xfer: &mut dyn HostTransport, pattern: u8) -> Result<()> {
        if !(1..=5).contains(&pattern) {
            return Err(DriverError::InvalidParam("test pattern selector must be 1..=5"));
        }
        if self.usb3 {
            return Err(DriverError::InvalidParam("test modes are a USB 2.0 hub feature"));
        }
        for port in 1..=self.ports {
            xfer.set_port_feature(port, HubPortFeature::PortSuspend, 0)?;
        }
        // Port 0 addresses the hub itself.
        xfer.set_port_feature(0, HubPortFeature::PortTest, pattern)?;
        info!("hub entered test mode {}, power-cycle to leave", pattern);
        Ok(())
    }
}

impl ClassDriver for Hub {
    fn init(&mut self, xfer: &mut dyn HostTransport) -> Result<()> {
        if self.usb3 {
            let depth = Self::depth(xfer.route_string());
            xfer.set_hub_depth(depth)?;
        }
        for port in 1..=self.ports {
            xfer.set_port_feature(port, HubPortFeature::PortPower, 0)?;
        }
        thread::sleep(Duration::from_millis(self.power_on_delay_ms));
        Ok(())
    }

    fn print_info(&self) {
        info!(
            "{} hub with {} downstream ports",
            if self.usb3 { "superspeed" } else { "usb2" },
            self.ports
        );
    }

    fn properties(&self) -> DriverProperties {
        DriverProperties {
            name: "hub",
            interface_class: class_code::HUB,
            ports: Some(self.ports),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_counts_route_tiers() {
        assert_eq!(Hub::depth(0), 0);
        assert_eq!(Hub::depth(0x3), 1);
        assert_eq!(Hub::depth(0x21), 2);
        assert_eq!(Hub::depth(0x0004_1215), 5);
    }
}
