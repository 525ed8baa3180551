//! Hub class descriptors and port status words (USB2 11.23 / USB32 10.13).

use bitflags::bitflags;

use super::desc::{DescCursor, DescError};
use super::DescriptorKind;

/// USB 2.0 hub descriptor (class request, descriptor kind 0x29).
#[derive(Clone, Copy, Debug, Default)]
pub struct HubDescriptorV2 {
    pub ports: u8,
    pub characteristics: u16,
    /// Time, in 2 ms units, from port power-on to power good.
    pub power_on_good: u8,
    pub current: u8,
    /// DeviceRemovable bitmap, one bit per port starting at bit 1.
    /// Only the first 32 ports are retained; larger hubs do not exist
    /// in practice.
    pub removable_mask: u32,
}

impl HubDescriptorV2 {
    pub const DESCRIPTOR_KIND: u8 = DescriptorKind::Hub as u8;

    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let length = cur.expect_header(Self::DESCRIPTOR_KIND)?;
        let ports = cur.read_u8()?;
        let characteristics = cur.read_u16()?;
        let power_on_good = cur.read_u8()?;
        let current = cur.read_u8()?;
        // The removable bitmap is (ports + 1 + 7) / 8 bytes; a truncated
        // reply here is tolerated since many hubs report all-removable.
        let mask_len = (usize::from(ports) + 1 + 7) / 8;
        let mut removable_mask = 0u32;
        for i in 0..mask_len.min(4) {
            match cur.read_u8() {
                Ok(b) => removable_mask |= u32::from(b) << (i * 8),
                Err(_) => break,
            }
        }
        let _ = length;
        Ok(Self {
            ports,
            characteristics,
            power_on_good,
            current,
            removable_mask,
        })
    }

    pub fn power_on_delay_ms(&self) -> u64 {
        u64::from(self.power_on_good) * 2
    }
}

/// SuperSpeed hub descriptor (descriptor kind 0x2A).
#[derive(Clone, Copy, Debug, Default)]
pub struct HubDescriptorV3 {
    pub ports: u8,
    pub characteristics: u16,
    pub power_on_good: u8,
    pub current: u8,
    /// Worst-case header decode latency, 0.1 µs units.
    pub decode_latency: u8,
    pub delay: u16,
    pub removable_mask: u32,
}

impl HubDescriptorV3 {
    pub const DESCRIPTOR_KIND: u8 = DescriptorKind::SuperSpeedHub as u8;

    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let _length = cur.expect_header(Self::DESCRIPTOR_KIND)?;
        Ok(Self {
            ports: cur.read_u8()?,
            characteristics: cur.read_u16()?,
            power_on_good: cur.read_u8()?,
            current: cur.read_u8()?,
            decode_latency: cur.read_u8()?,
            delay: cur.read_u16()?,
            removable_mask: cur.read_u16()? as u32,
        })
    }

    pub fn power_on_delay_ms(&self) -> u64 {
        u64::from(self.power_on_good) * 2
    }
}

/// Port feature selectors shared by the USB 2.0 and 3.x hub classes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum HubPortFeature {
    PortConnection = 0,
    PortEnable = 1,
    PortSuspend = 2,
    PortOverCurrent = 3,
    PortReset = 4,
    PortLinkState = 5,
    PortPower = 8,
    PortTest = 21,
    CPortConnection = 16,
    CPortEnable = 17,
    CPortSuspend = 18,
    CPortOverCurrent = 19,
    CPortReset = 20,
}

bitflags! {
    /// wPortStatus | wPortChange << 16, USB 2.0 hubs (USB2 table 11-21).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct HubPortStatusV2: u32 {
        const CONNECTION = 1 << 0;
        const ENABLE = 1 << 1;
        const SUSPEND = 1 << 2;
        const OVER_CURRENT = 1 << 3;
        const RESET = 1 << 4;
        // bits 5-7 reserved
        const POWER = 1 << 8;
        const LOW_SPEED = 1 << 9;
        const HIGH_SPEED = 1 << 10;
        const TEST = 1 << 11;
        const INDICATOR = 1 << 12;
        // bits 13-15 reserved
        const CONNECTION_CHANGED = 1 << 16;
        const ENABLE_CHANGED = 1 << 17;
        const SUSPEND_CHANGED = 1 << 18;
        const OVER_CURRENT_CHANGED = 1 << 19;
        const RESET_CHANGED = 1 << 20;
    }
}

bitflags! {
    /// wPortStatus | wPortChange << 16, USB 3.x hubs (USB32 table 10-10).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct HubPortStatusV3: u32 {
        const CONNECTION = 1 << 0;
        const ENABLE = 1 << 1;
        // bit 2 reserved
        const OVER_CURRENT = 1 << 3;
        const RESET = 1 << 4;
        const LINK_STATE_0 = 1 << 5;
        const LINK_STATE_1 = 1 << 6;
        const LINK_STATE_2 = 1 << 7;
        const LINK_STATE_3 = 1 << 8;
        const POWER = 1 << 9;
        const SPEED_0 = 1 << 10;
        const SPEED_1 = 1 << 11;
        const SPEED_2 = 1 << 12;
        // bits 13-15 reserved
        const CONNECTION_CHANGED = 1 << 16;
        const OVER_CURRENT_CHANGED = 1 << 19;
        const RESET_CHANGED = 1 << 20;
        const BH_RESET_CHANGED = 1 << 21;
        const LINK_STATE_CHANGED = 1 << 22;
        const CONFIG_ERROR = 1 << 23;
    }
}

/// Port status as read from either hub generation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HubPortStatus {
    V2(HubPortStatusV2),
    V3(HubPortStatusV3),
}

impl HubPortStatus {
    /// Decodes the 4-byte little-endian GetPortStatus reply.
    pub fn from_wire(buf: [u8; 4], usb3: bool) -> Self {
        let raw = u32::from_le_bytes(buf);
        if usb3 {
            Self::V3(HubPortStatusV3::from_bits_retain(raw))
        } else {
            Self::V2(HubPortStatusV2::from_bits_retain(raw))
        }
    }

    pub fn is_powered(&self) -> bool {
        match self {
            Self::V2(x) => x.contains(HubPortStatusV2::POWER),
            Self::V3(x) => x.contains(HubPortStatusV3::POWER),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::V2(x) => x.contains(HubPortStatusV2::CONNECTION),
            Self::V3(x) => x.contains(HubPortStatusV3::CONNECTION),
        }
    }

    pub fn is_resetting(&self) -> bool {
        match self {
            Self::V2(x) => x.contains(HubPortStatusV2::RESET),
            Self::V3(x) => x.contains(HubPortStatusV3::RESET),
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::V2(x) => x.contains(HubPortStatusV2::ENABLE),
            Self::V3(x) => x.contains(HubPortStatusV3::ENABLE),
        }
    }

    pub fn connection_changed(&self) -> bool {
        match self {
            Self::V2(x) => x.contains(HubPortStatusV2::CONNECTION_CHANGED),
            Self::V3(x) => x.contains(HubPortStatusV3::CONNECTION_CHANGED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v2_descriptor() {
        let buf = [9u8, 0x29, 4, 0x09, 0x00, 50, 0, 0x1E, 0x00];
        let h = HubDescriptorV2::parse(&buf).unwrap();
        assert_eq!(h.ports, 4);
        assert_eq!(h.power_on_delay_ms(), 100);
        assert_eq!(h.removable_mask & 0x1E, 0x1E);
    }

    #[test]
    fn port_status_wire_decode() {
        let sts = HubPortStatus::from_wire([0x03, 0x01, 0x01, 0x00], false);
        assert!(sts.is_connected());
        assert!(sts.is_enabled());
        assert!(sts.is_powered());
        assert!(sts.connection_changed());
        assert!(!sts.is_resetting());
    }
}
