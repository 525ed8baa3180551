//! Endpoint, SuperSpeed companion, and HID descriptors.
//!
//! Endpoint descriptors carry the raw transfer-type/direction bits and the
//! packed `wMaxPacketSize` field; the translator in [`crate::endpoint`] turns
//! these into a transport-neutral [`crate::endpoint::EndpointInfo`].

use super::desc::{check_consumed, DescCursor, DescError};
use super::DescriptorKind;

/// Mask over `attributes` selecting the transfer type (USB32 table 9-26).
pub const ENDP_ATTR_TY_MASK: u8 = 0x3;

#[derive(Clone, Copy, Debug, Default)]
pub struct EndpointDescriptor {
    /// Endpoint number in bits 3:0, direction in bit 7 (1 = IN).
    pub address: u8,
    /// Transfer type in bits 1:0, sync type 3:2, usage type 5:4.
    pub attributes: u8,
    /// Base packet size in bits 10:0; for high-speed high-bandwidth
    /// endpoints, bits 12:11 carry the extra transactions per microframe.
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    pub const LENGTH: usize = 7;

    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let length = cur.expect_header(DescriptorKind::Endpoint as u8)?;
        let desc = Self {
            address: cur.read_u8()?,
            attributes: cur.read_u8()?,
            max_packet_size: cur.read_u16()?,
            interval: cur.read_u8()?,
        };
        check_consumed("endpoint", length, cur.consumed());
        Ok(desc)
    }

    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    pub fn is_in(&self) -> bool {
        self.address & 0x80 != 0
    }

    pub fn transfer_type_bits(&self) -> u8 {
        self.attributes & ENDP_ATTR_TY_MASK
    }

    pub fn sync_type(&self) -> u8 {
        (self.attributes >> 2) & 0x3
    }

    pub fn usage_type(&self) -> u8 {
        (self.attributes >> 4) & 0x3
    }

    /// Base packet size without the extra-transaction bits.
    pub fn base_packet_size(&self) -> u16 {
        self.max_packet_size & 0x07FF
    }

    /// Extra transactions per microframe (high-bandwidth periodic endpoints).
    pub fn extra_transactions(&self) -> u16 {
        (self.max_packet_size >> 11) & 0x3
    }
}

/// SuperSpeed Endpoint Companion descriptor (USB32 9.6.7); when present it
/// immediately follows the endpoint descriptor it augments.
#[derive(Clone, Copy, Debug, Default)]
pub struct SuperSpeedCompanionDescriptor {
    pub max_burst: u8,
    /// Bulk: MaxStreams in bits 4:0. Isoch: Mult in bits 1:0.
    pub attributes: u8,
    pub bytes_per_interval: u16,
}

impl SuperSpeedCompanionDescriptor {
    pub const LENGTH: usize = 6;

    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let length = cur.expect_header(DescriptorKind::SuperSpeedCompanion as u8)?;
        let desc = Self {
            max_burst: cur.read_u8()?,
            attributes: cur.read_u8()?,
            bytes_per_interval: cur.read_u16()?,
        };
        check_consumed("ss companion", length, cur.consumed());
        Ok(desc)
    }

    pub fn bulk_max_streams(&self) -> u8 {
        self.attributes & 0x1F
    }

    pub fn isoch_mult(&self) -> u8 {
        self.attributes & 0x3
    }
}

/// The class descriptor a HID interface embeds in its configuration blob.
#[derive(Clone, Copy, Debug, Default)]
pub struct HidDescriptor {
    pub hid_spec_release: u16,
    pub country_code: u8,
    pub num_descriptors: u8,
    pub report_desc_ty: u8,
    pub report_desc_len: u16,
}

impl HidDescriptor {
    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let length = cur.expect_header(DescriptorKind::Hid as u8)?;
        let desc = Self {
            hid_spec_release: cur.read_u16()?,
            country_code: cur.read_u8()?,
            num_descriptors: cur.read_u8()?,
            report_desc_ty: cur.read_u8()?,
            report_desc_len: cur.read_u16()?,
        };
        check_consumed("hid", length, cur.consumed());
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_attribute_helpers() {
        // 0x81 = EP1 IN, attributes 0x05 = isoch + async sync.
        let buf = [7u8, 5, 0x81, 0x05, 0x00, 0x14, 1];
        let e = EndpointDescriptor::parse(&buf).unwrap();
        assert_eq!(e.number(), 1);
        assert!(e.is_in());
        assert_eq!(e.transfer_type_bits(), 1);
        assert_eq!(e.sync_type(), 1);
        assert_eq!(e.base_packet_size(), 0x400);
        assert_eq!(e.extra_transactions(), 2);
    }

    #[test]
    fn companion_field_split() {
        let buf = [6u8, 48, 3, 0x12, 0x00, 0x04];
        let c = SuperSpeedCompanionDescriptor::parse(&buf).unwrap();
        assert_eq!(c.max_burst, 3);
        assert_eq!(c.bulk_max_streams(), 0x12);
        assert_eq!(c.isoch_mult(), 2);
        assert_eq!(c.bytes_per_interval, 0x0400);
    }
}
