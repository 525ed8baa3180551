//! The Device USB descriptor (USB32 section 9.6.1).

use super::desc::{check_consumed, DescCursor, DescError};
use super::DescriptorKind;

/// A USB Device Descriptor.
///
/// Common to all USB standards; "provides information that applies globally
/// to the device and all the device's configurations" (USB32 9.6.1). A device
/// has exactly one, always 18 bytes on the wire.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceDescriptor {
    /// The USB standard version in binary-coded decimal (2.1 is 0x0210).
    pub usb: u16,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    /// Maximum packet size for endpoint 0.
    pub packet_size: u8,
    pub vendor: u16,
    pub product: u16,
    /// Device release number, binary-coded decimal.
    pub release: u16,
    /// String descriptor indices; zero means absent.
    pub manufacturer_str: u8,
    pub product_str: u8,
    pub serial_str: u8,
    pub configurations: u8,
}

impl DeviceDescriptor {
    pub const LENGTH: usize = 18;

    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let length = cur.expect_header(DescriptorKind::Device as u8)?;
        let desc = Self {
            usb: cur.read_u16()?,
            class: cur.read_u8()?,
            sub_class: cur.read_u8()?,
            protocol: cur.read_u8()?,
            packet_size: cur.read_u8()?,
            vendor: cur.read_u16()?,
            product: cur.read_u16()?,
            release: cur.read_u16()?,
            manufacturer_str: cur.read_u8()?,
            product_str: cur.read_u8()?,
            serial_str: cur.read_u8()?,
            configurations: cur.read_u8()?,
        };
        check_consumed("device", length, cur.consumed());
        Ok(desc)
    }

    pub fn major_version(&self) -> u8 {
        ((self.usb & 0xFF00) >> 8) as u8
    }

    pub fn minor_version(&self) -> u8 {
        self.usb as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE: [u8; 18] = [
        18, 1, 0x00, 0x02, 0, 0, 0, 64, 0x81, 0x07, 0x34, 0x12, 0x01, 0x00, 1, 2, 3, 1,
    ];

    #[test]
    fn parses_all_fields() {
        let d = DeviceDescriptor::parse(&SAMPLE).unwrap();
        assert_eq!(d.usb, 0x0200);
        assert_eq!(d.major_version(), 2);
        assert_eq!(d.packet_size, 64);
        assert_eq!(d.vendor, 0x0781);
        assert_eq!(d.product, 0x1234);
        assert_eq!(d.serial_str, 3);
        assert_eq!(d.configurations, 1);
    }

    #[test]
    fn wrong_type_is_fatal() {
        let mut buf = SAMPLE;
        buf[1] = 2;
        assert!(DeviceDescriptor::parse(&buf).is_err());
    }

    #[test]
    fn truncated_is_fatal() {
        assert!(DeviceDescriptor::parse(&SAMPLE[..10]).is_err());
    }
}
