//! Device enumeration and driver dispatch.
//!
//! Enumeration is sequential and fail-fast: descriptors are fetched and
//! validated, the interface class picks a driver, the driver reports the
//! endpoints it wants configured, and only then is the device configured
//! and the driver initialized. Any error drops the partially constructed
//! driver and everything it holds.

use log::{debug, info, warn};
use smallvec::SmallVec;

use crate::class::{ClassDriver, Driver, DriverError, Result};
use crate::endpoint::EndpointInfo;
use crate::transport::{HostTransport, ReqRecipient};
use crate::usb::config::ConfigDescriptor;
use crate::usb::desc::{decode_header, find_next, DescError};
use crate::usb::device::DeviceDescriptor;
use crate::usb::endpoint::{EndpointDescriptor, SuperSpeedCompanionDescriptor};
use crate::usb::interface::{InterfaceAssocDescriptor, InterfaceDescriptor};
use crate::usb::uvc::SUBCLASS_INTERFACE_COLLECTION;
use crate::usb::{class_code, class_name, DescriptorKind};

/// Retry buffer for devices whose config-descriptor head probe comes back
/// mangled.
const CONFIG_RETRY_LEN: usize = 512;

/// One interface with its endpoints (and their SuperSpeed companions).
#[derive(Clone, Debug)]
pub struct InterfaceTree {
    pub desc: InterfaceDescriptor,
    pub endpoints: SmallVec<[(EndpointDescriptor, Option<SuperSpeedCompanionDescriptor>); 4]>,
}

/// A parsed configuration: the header, the interface/endpoint tree, and the
/// raw blob for class drivers that walk class-specific records themselves.
#[derive(Clone, Debug)]
pub struct ConfigTree {
    pub desc: ConfigDescriptor,
    pub interfaces: SmallVec<[InterfaceTree; 2]>,
    pub raw: Vec<u8>,
}

impl ConfigTree {
    pub fn parse(raw: Vec<u8>) -> Result<Self, DescError> {
        let desc = ConfigDescriptor::parse(&raw)?;
        if usize::from(desc.total_length) != raw.len() {
            warn!(
                "configuration blob is {} bytes, header declares {}",
                raw.len(),
                desc.total_length
            );
        }

        let mut interfaces: SmallVec<[InterfaceTree; 2]> = SmallVec::new();
        let mut offset = 0usize;
        while offset + 2 <= raw.len() {
            let (kind, length) = decode_header(&raw, offset, None)?;
            if length == 0 {
                return Err(DescError::ZeroLength(offset));
            }
            if kind == DescriptorKind::Interface as u8 {
                interfaces.push(InterfaceTree {
                    desc: InterfaceDescriptor::parse(&raw[offset..])?,
                    endpoints: SmallVec::new(),
                });
            } else if kind == DescriptorKind::Endpoint as u8 {
                if let Some(iface) = interfaces.last_mut() {
                    iface
                        .endpoints
                        .push((EndpointDescriptor::parse(&raw[offset..])?, None));
                }
            } else if kind == DescriptorKind::SuperSpeedCompanion as u8 {
                if let Some((_, slot)) = interfaces
                    .last_mut()
                    .and_then(|iface| iface.endpoints.last_mut())
                {
                    if slot.is_none() {
                        *slot =
                            Some(SuperSpeedCompanionDescriptor::parse(&raw[offset..])?);
                    }
                }
            }
            offset += usize::from(length);
        }

        Ok(Self {
            desc,
            interfaces,
            raw,
        })
    }

    /// The video-function IAD, when the configuration carries one.
    pub fn video_association(&self) -> Option<InterfaceAssocDescriptor> {
        let mut offset = 0usize;
        loop {
            let at = offset
                + find_next(
                    &self.raw[offset..],
                    DescriptorKind::InterfaceAssociation as u8,
                )
                .ok()?;
            if let Ok(assoc) = InterfaceAssocDescriptor::parse(&self.raw[at..]) {
                if assoc.function_class == class_code::VIDEO
                    && assoc.function_sub_class == SUBCLASS_INTERFACE_COLLECTION
                {
                    return Some(assoc);
                }
            }
            offset = at + 2;
        }
    }
}

/// Everything learned about a device before (and independent of) its driver.
#[derive(Debug)]
pub struct DeviceInfo {
    pub desc: DeviceDescriptor,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
    pub config: ConfigTree,
}

fn fetch_string(xfer: &mut dyn HostTransport, index: u8) -> Option<String> {
    if index == 0 {
        return None;
    }
    match xfer.get_string(index) {
        Ok(s) => Some(s),
        Err(e) => {
            // Plenty of devices advertise string indices they then NAK.
            debug!("string descriptor {} unavailable: {}", index, e);
            None
        }
    }
}

fn fetch_config(xfer: &mut dyn HostTransport) -> Result<ConfigTree> {
    let mut head = [0u8; ConfigDescriptor::LENGTH];
    xfer.get_descriptor(
        ReqRecipient::Device,
        DescriptorKind::Configuration as u8,
        0,
        0,
        &mut head,
    )?;
    let desc = match ConfigDescriptor::parse(&head) {
        Ok(desc) => desc,
        Err(DescError::TypeMismatch { expected, found }) => {
            // Some devices botch short config reads; one full-size retry.
            warn!(
                "config head probe returned type {:#04x} (wanted {:#04x}), retrying",
                found, expected
            );
            let mut retry = [0u8; CONFIG_RETRY_LEN];
            xfer.get_descriptor(
                ReqRecipient::Device,
                DescriptorKind::Configuration as u8,
                0,
                0,
                &mut retry,
            )?;
            ConfigDescriptor::parse(&retry)?
        }
        Err(e) => return Err(e.into()),
    };

    let total = usize::from(desc.total_length).max(ConfigDescriptor::LENGTH);
    let mut raw = vec![0u8; total];
    xfer.get_descriptor(
        ReqRecipient::Device,
        DescriptorKind::Configuration as u8,
        0,
        0,
        &mut raw,
    )?;
    Ok(ConfigTree::parse(raw)?)
}

/// Device and configuration descriptors plus best-effort strings.
fn gather(xfer: &mut dyn HostTransport) -> Result<DeviceInfo> {
    let mut buf = [0u8; DeviceDescriptor::LENGTH];
    xfer.get_descriptor(
        ReqRecipient::Device,
        DescriptorKind::Device as u8,
        0,
        0,
        &mut buf,
    )?;
    let desc = DeviceDescriptor::parse(&buf)?;
    debug!(
        "device {:04x}:{:04x}, usb {}.{}, class {}",
        desc.vendor,
        desc.product,
        desc.major_version(),
        desc.minor_version(),
        class_name(desc.class)
    );

    let manufacturer = fetch_string(xfer, desc.manufacturer_str);
    let product = fetch_string(xfer, desc.product_str);
    let serial = fetch_string(xfer, desc.serial_str);
    let config = fetch_config(xfer)?;

    Ok(DeviceInfo {
        desc,
        manufacturer,
        product,
        serial,
        config,
    })
}

/// Enumerates the device behind `xfer` and constructs its class driver.
///
/// An interface class without a driver yields `Ok((info, None))` without
/// touching the device's configuration. With a driver, the device is fully
/// configured and the driver initialized before returning.
pub fn enumerate(xfer: &mut dyn HostTransport) -> Result<(DeviceInfo, Option<Driver>)> {
    let info = gather(xfer)?;
    // The blob must contain at least one interface record.
    find_next(&info.config.raw, DescriptorKind::Interface as u8)?;
    let first_if = info
        .config
        .interfaces
        .first()
        .ok_or(DriverError::Protocol("configuration has no interfaces"))?
        .clone();

    let usb_version = info.desc.usb;
    let speed = xfer.link_speed();

    let mut hub_ports = None;
    let bound = match first_if.desc.class {
        class_code::MASS_STORAGE => {
            let (driver, eps) = crate::class::MassStorage::bind(&first_if, usb_version, speed)?;
            Some((Driver::MassStorage(driver), eps))
        }
        class_code::HID => {
            let (driver, eps) = crate::class::HidMouse::bind(&first_if, usb_version, speed)?;
            Some((Driver::Hid(driver), eps))
        }
        class_code::HUB => {
            let (driver, eps) = crate::class::Hub::bind(xfer, &first_if, usb_version, speed)?;
            hub_ports = Some(driver.ports());
            Some((Driver::Hub(driver), eps))
        }
        class_code::VIDEO => {
            let (driver, eps) = crate::class::Video::bind(&info.config, usb_version, speed)?;
            Some((Driver::Video(driver), eps))
        }
        // A video function can also hide behind a vendor-specific first
        // interface when the IAD groups it.
        _ if info.config.video_association().is_some() => {
            let (driver, eps) = crate::class::Video::bind(&info.config, usb_version, speed)?;
            Some((Driver::Video(driver), eps))
        }
        other => {
            info!(
                "no driver for interface class {} ({})",
                other,
                class_name(other)
            );
            None
        }
    };

    let (mut driver, endpoints) = match bound {
        Some(b) => b,
        None => return Ok((info, None)),
    };

    configure(xfer, &endpoints, hub_ports, info.config.desc.configuration_value)?;
    driver.init(xfer)?;
    driver.print_info();
    Ok((info, Some(driver)))
}

fn configure(
    xfer: &mut dyn HostTransport,
    endpoints: &[EndpointInfo],
    hub_ports: Option<u8>,
    configuration_value: u8,
) -> Result<()> {
    xfer.evaluate_context(0)?;
    if !endpoints.is_empty() {
        xfer.configure_endpoints(endpoints, hub_ports)?;
    }
    xfer.set_configuration(configuration_value)?;
    Ok(())
}

/// Configures a recognized device generically, without class logic, for
/// embedders that want raw endpoint access.
pub fn enumerate_generic(xfer: &mut dyn HostTransport) -> Result<(DeviceInfo, Driver)> {
    let info = gather(xfer)?;
    let first_if = info
        .config
        .interfaces
        .first()
        .ok_or(DriverError::Protocol("configuration has no interfaces"))?;
    let usb_version = info.desc.usb;
    let speed = xfer.link_speed();
    let endpoints: Vec<EndpointInfo> = first_if
        .endpoints
        .iter()
        .map(|(desc, companion)| {
            crate::endpoint::translate(desc, companion.as_ref(), usb_version, speed)
        })
        .collect();

    configure(xfer, &endpoints, None, info.config.desc.configuration_value)?;
    let driver = Driver::Generic(crate::class::ConfigurableGeneric {
        interface_class: first_if.desc.class,
        endpoint_count: endpoints.len(),
    });
    Ok((info, driver))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msc_config_blob() -> Vec<u8> {
        let mut raw = Vec::new();
        // Configuration header.
        raw.extend_from_slice(&[9, 2, 32, 0, 1, 1, 0, 0x80, 50]);
        // Interface: mass storage, SCSI, BOT.
        raw.extend_from_slice(&[9, 4, 0, 0, 2, 0x08, 0x06, 0x50, 0]);
        // Bulk-in 0x81, bulk-out 0x02.
        raw.extend_from_slice(&[7, 5, 0x81, 2, 0x00, 0x02, 0]);
        raw.extend_from_slice(&[7, 5, 0x02, 2, 0x00, 0x02, 0]);
        let total = raw.len() as u16;
        raw[2..4].copy_from_slice(&total.to_le_bytes());
        raw
    }

    #[test]
    fn config_tree_groups_endpoints_under_interfaces() {
        let tree = ConfigTree::parse(msc_config_blob()).unwrap();
        assert_eq!(tree.interfaces.len(), 1);
        let iface = &tree.interfaces[0];
        assert_eq!(iface.desc.class, 0x08);
        assert_eq!(iface.endpoints.len(), 2);
        assert!(iface.endpoints[0].0.is_in());
        assert!(!iface.endpoints[1].0.is_in());
        assert!(iface.endpoints.iter().all(|(_, c)| c.is_none()));
    }

    #[test]
    fn config_tree_attaches_companions() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&[9, 2, 0, 0, 1, 1, 0, 0x80, 50]);
        raw.extend_from_slice(&[9, 4, 0, 0, 1, 0x08, 0x06, 0x50, 0]);
        raw.extend_from_slice(&[7, 5, 0x81, 2, 0x00, 0x04, 0]);
        // SuperSpeed companion: burst 3, streams attr, no bytes/interval.
        raw.extend_from_slice(&[6, 48, 3, 2, 0, 0]);
        let total = raw.len() as u16;
        raw[2..4].copy_from_slice(&total.to_le_bytes());

        let tree = ConfigTree::parse(raw).unwrap();
        let (_, companion) = &tree.interfaces[0].endpoints[0];
        assert_eq!(companion.unwrap().max_burst, 3);
    }

    #[test]
    fn zero_length_record_is_rejected() {
        let mut raw = msc_config_blob();
        raw[9] = 0; // first interface record's bLength
        assert!(matches!(
            ConfigTree::parse(raw),
            Err(DescError::ZeroLength(9))
        ));
    }
}
