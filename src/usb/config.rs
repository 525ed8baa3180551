//! The Configuration USB descriptor (USB32 section 9.6.3).

use super::desc::{check_consumed, DescCursor, DescError};
use super::DescriptorKind;

/// A USB Configuration Descriptor header.
///
/// On the wire this is the 9-byte head of a blob whose `total_length` covers
/// every interface, endpoint, and class-specific record of the configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigDescriptor {
    pub total_length: u16,
    pub interfaces: u8,
    pub configuration_value: u8,
    pub configuration_str: u8,
    pub attributes: u8,
    /// Units of 2 mA (USB2) or 8 mA (gen X).
    pub max_power: u8,
}

impl ConfigDescriptor {
    pub const LENGTH: usize = 9;

    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let length = cur.expect_header(DescriptorKind::Configuration as u8)?;
        let desc = Self {
            total_length: cur.read_u16()?,
            interfaces: cur.read_u8()?,
            configuration_value: cur.read_u8()?,
            configuration_str: cur.read_u8()?,
            attributes: cur.read_u8()?,
            max_power: cur.read_u8()?,
        };
        check_consumed("configuration", length, cur.consumed());
        Ok(desc)
    }

    pub fn self_powered(&self) -> bool {
        self.attributes & (1 << 6) != 0
    }

    pub fn remote_wakeup(&self) -> bool {
        self.attributes & (1 << 5) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header() {
        let buf = [9u8, 2, 0x22, 0x00, 1, 1, 0, 0xA0, 50];
        let c = ConfigDescriptor::parse(&buf).unwrap();
        assert_eq!(c.total_length, 0x22);
        assert_eq!(c.configuration_value, 1);
        assert!(!c.self_powered());
        assert!(c.remote_wakeup());
    }
}
