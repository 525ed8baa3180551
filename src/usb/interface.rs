//! Interface and Interface Association descriptors (USB32 9.6.5 / 9.6.4).

use super::desc::{check_consumed, DescCursor, DescError};
use super::DescriptorKind;

#[derive(Clone, Copy, Debug, Default)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alternate_setting: u8,
    pub endpoints: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub interface_str: u8,
}

impl InterfaceDescriptor {
    pub const LENGTH: usize = 9;

    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let length = cur.expect_header(DescriptorKind::Interface as u8)?;
        let desc = Self {
            number: cur.read_u8()?,
            alternate_setting: cur.read_u8()?,
            endpoints: cur.read_u8()?,
            class: cur.read_u8()?,
            sub_class: cur.read_u8()?,
            protocol: cur.read_u8()?,
            interface_str: cur.read_u8()?,
        };
        check_consumed("interface", length, cur.consumed());
        Ok(desc)
    }
}

/// Groups the interfaces of one device function (a UVC camera spans a
/// control interface and a streaming interface under one of these).
#[derive(Clone, Copy, Debug, Default)]
pub struct InterfaceAssocDescriptor {
    pub first_interface: u8,
    pub interface_count: u8,
    pub function_class: u8,
    pub function_sub_class: u8,
    pub function_protocol: u8,
    pub function_str: u8,
}

impl InterfaceAssocDescriptor {
    pub const LENGTH: usize = 8;

    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let length = cur.expect_header(DescriptorKind::InterfaceAssociation as u8)?;
        let desc = Self {
            first_interface: cur.read_u8()?,
            interface_count: cur.read_u8()?,
            function_class: cur.read_u8()?,
            function_sub_class: cur.read_u8()?,
            function_protocol: cur.read_u8()?,
            function_str: cur.read_u8()?,
        };
        check_consumed("interface association", length, cur.consumed());
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interface() {
        let buf = [9u8, 4, 0, 0, 2, 8, 6, 0x50, 0];
        let i = InterfaceDescriptor::parse(&buf).unwrap();
        assert_eq!(i.class, 8);
        assert_eq!(i.sub_class, 6);
        assert_eq!(i.protocol, 0x50);
        assert_eq!(i.endpoints, 2);
    }

    #[test]
    fn parses_association() {
        let buf = [8u8, 11, 0, 2, 0x0E, 0x03, 0, 0];
        let a = InterfaceAssocDescriptor::parse(&buf).unwrap();
        assert_eq!(a.function_class, 0x0E);
        assert_eq!(a.function_sub_class, 0x03);
        assert_eq!(a.interface_count, 2);
    }
}
