//! USB Video Class (UVC 1.0/1.1/1.5) class-specific records.
//!
//! Only the pieces the streaming driver needs: the video-control header (for
//! protocol-version detection), the streaming input header, the probe/commit
//! control block, and the per-payload header framing isochronous data.

use super::desc::{DescCursor, DescError};

/// Video interface subclasses.
pub const SUBCLASS_VIDEO_CONTROL: u8 = 0x01;
pub const SUBCLASS_VIDEO_STREAMING: u8 = 0x02;
pub const SUBCLASS_INTERFACE_COLLECTION: u8 = 0x03;

/// Class-specific VC interface descriptor subtypes.
pub const VC_HEADER: u8 = 0x01;

/// Class-specific VS interface descriptor subtypes.
pub const VS_INPUT_HEADER: u8 = 0x01;
pub const VS_FORMAT_MJPEG: u8 = 0x06;
pub const VS_FRAME_MJPEG: u8 = 0x07;

/// Class request codes.
pub const SET_CUR: u8 = 0x01;
pub const GET_CUR: u8 = 0x81;
pub const GET_DEF: u8 = 0x87;

/// VideoStreaming control selectors (wValue high byte).
pub const VS_PROBE_CONTROL: u8 = 0x01;
pub const VS_COMMIT_CONTROL: u8 = 0x02;

/// The class-specific VideoControl header; its `bcdUVC` field decides which
/// probe/commit layout the device speaks.
#[derive(Clone, Copy, Debug, Default)]
pub struct VcHeader {
    pub bcd_uvc: u16,
    pub total_length: u16,
    pub clock_frequency: u32,
    pub in_collection: u8,
}

impl VcHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let _length = cur.expect_header(super::DESC_KIND_CS_INTERFACE)?;
        let subtype = cur.read_u8()?;
        if subtype != VC_HEADER {
            return Err(DescError::TypeMismatch {
                expected: VC_HEADER,
                found: subtype,
            });
        }
        Ok(Self {
            bcd_uvc: cur.read_u16()?,
            total_length: cur.read_u16()?,
            clock_frequency: cur.read_u32()?,
            in_collection: cur.read_u8()?,
        })
    }

    /// The original 1.0 release used a shorter probe/commit control; every
    /// later revision extends the 1.1 layout compatibly.
    pub fn is_obsolete_1_0(&self) -> bool {
        self.bcd_uvc < 0x0110
    }
}

/// The class-specific VideoStreaming input header (first CS record of the
/// streaming interface); carries the format count and the data endpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct VsInputHeader {
    pub num_formats: u8,
    pub total_length: u16,
    pub endpoint_address: u8,
    pub info: u8,
    pub terminal_link: u8,
}

impl VsInputHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        let mut cur = DescCursor::new(buf);
        let _length = cur.expect_header(super::DESC_KIND_CS_INTERFACE)?;
        let subtype = cur.read_u8()?;
        if subtype != VS_INPUT_HEADER {
            return Err(DescError::TypeMismatch {
                expected: VS_INPUT_HEADER,
                found: subtype,
            });
        }
        Ok(Self {
            num_formats: cur.read_u8()?,
            total_length: cur.read_u16()?,
            endpoint_address: cur.read_u8()?,
            info: cur.read_u8()?,
            terminal_link: cur.read_u8()?,
        })
    }
}

/// Wire size of the probe/commit control per protocol revision.
pub const PROBE_LEN_V10: usize = 26;
pub const PROBE_LEN_V11: usize = 34;
pub const PROBE_LEN_V15: usize = 48;

/// The VS probe/commit control block, UVC 1.1 field set.
///
/// UVC 1.0 devices only carry the first 26 bytes; 1.5 devices append fields
/// this driver does not interpret. Serialization always emits little-endian.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProbeCommit {
    pub hint: u16,
    pub format_index: u8,
    pub frame_index: u8,
    /// Frame interval in 100 ns units.
    pub frame_interval: u32,
    pub key_frame_rate: u16,
    pub p_frame_rate: u16,
    pub comp_quality: u16,
    pub comp_window_size: u16,
    pub delay: u16,
    pub max_video_frame_size: u32,
    pub max_payload_transfer_size: u32,
    // UVC 1.1 extension.
    pub clock_frequency: u32,
    pub framing_info: u8,
    pub preferred_version: u8,
    pub min_version: u8,
    pub max_version: u8,
}

impl ProbeCommit {
    /// Serializes to the layout the device expects; `len` is one of the
    /// `PROBE_LEN_*` constants (1.5 devices accept the 1.1 prefix padded
    /// with zeros).
    pub fn to_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        buf[0..2].copy_from_slice(&self.hint.to_le_bytes());
        buf[2] = self.format_index;
        buf[3] = self.frame_index;
        buf[4..8].copy_from_slice(&self.frame_interval.to_le_bytes());
        buf[8..10].copy_from_slice(&self.key_frame_rate.to_le_bytes());
        buf[10..12].copy_from_slice(&self.p_frame_rate.to_le_bytes());
        buf[12..14].copy_from_slice(&self.comp_quality.to_le_bytes());
        buf[14..16].copy_from_slice(&self.comp_window_size.to_le_bytes());
        buf[16..18].copy_from_slice(&self.delay.to_le_bytes());
        buf[18..22].copy_from_slice(&self.max_video_frame_size.to_le_bytes());
        buf[22..26].copy_from_slice(&self.max_payload_transfer_size.to_le_bytes());
        if len >= PROBE_LEN_V11 {
            buf[26..30].copy_from_slice(&self.clock_frequency.to_le_bytes());
            buf[30] = self.framing_info;
            buf[31] = self.preferred_version;
            buf[32] = self.min_version;
            buf[33] = self.max_version;
        }
        buf
    }

    /// Parses a device reply. Truncated replies are tolerated down to 26
    /// bytes (the additional fields come back zeroed); anything shorter is a
    /// format error.
    pub fn parse(buf: &[u8]) -> Result<Self, DescError> {
        if buf.len() < PROBE_LEN_V10 {
            return Err(DescError::Truncated {
                offset: buf.len(),
                needed: PROBE_LEN_V10,
            });
        }
        let mut cur = DescCursor::new(buf);
        let mut pc = Self {
            hint: cur.read_u16()?,
            format_index: cur.read_u8()?,
            frame_index: cur.read_u8()?,
            frame_interval: cur.read_u32()?,
            key_frame_rate: cur.read_u16()?,
            p_frame_rate: cur.read_u16()?,
            comp_quality: cur.read_u16()?,
            comp_window_size: cur.read_u16()?,
            delay: cur.read_u16()?,
            max_video_frame_size: cur.read_u32()?,
            max_payload_transfer_size: cur.read_u32()?,
            ..Self::default()
        };
        if buf.len() >= PROBE_LEN_V11 {
            pc.clock_frequency = cur.read_u32()?;
            pc.framing_info = cur.read_u8()?;
            pc.preferred_version = cur.read_u8()?;
            pc.min_version = cur.read_u8()?;
            pc.max_version = cur.read_u8()?;
        }
        Ok(pc)
    }
}

/// Flags in the payload header's `bmHeaderInfo` byte.
pub const PAYLOAD_FLAG_FID: u8 = 1 << 0;
pub const PAYLOAD_FLAG_EOF: u8 = 1 << 1;
pub const PAYLOAD_FLAG_ERR: u8 = 1 << 6;

/// The header prefixed to every isochronous video payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct PayloadHeader {
    pub length: u8,
    pub info: u8,
}

impl PayloadHeader {
    /// Decodes the leading header of one payload; `None` for packets too
    /// short to carry one (empty isoch packets are routine).
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < 2 {
            return None;
        }
        let length = packet[0];
        if usize::from(length) > packet.len() || length < 2 {
            return None;
        }
        Some(Self {
            length,
            info: packet[1],
        })
    }

    pub fn frame_id(&self) -> bool {
        self.info & PAYLOAD_FLAG_FID != 0
    }

    pub fn end_of_frame(&self) -> bool {
        self.info & PAYLOAD_FLAG_EOF != 0
    }

    pub fn error(&self) -> bool {
        self.info & PAYLOAD_FLAG_ERR != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_roundtrip_v11() {
        let pc = ProbeCommit {
            format_index: 1,
            frame_index: 2,
            frame_interval: 333_333,
            max_video_frame_size: 614_400,
            max_payload_transfer_size: 3_072,
            framing_info: 3,
            ..Default::default()
        };
        let bytes = pc.to_bytes(PROBE_LEN_V11);
        assert_eq!(bytes.len(), PROBE_LEN_V11);
        assert_eq!(ProbeCommit::parse(&bytes).unwrap(), pc);
    }

    #[test]
    fn probe_parse_tolerates_truncation_to_v10() {
        let pc = ProbeCommit {
            format_index: 1,
            frame_index: 1,
            max_payload_transfer_size: 1024,
            ..Default::default()
        };
        let bytes = pc.to_bytes(PROBE_LEN_V10);
        let parsed = ProbeCommit::parse(&bytes).unwrap();
        assert_eq!(parsed.max_payload_transfer_size, 1024);
        assert_eq!(parsed.framing_info, 0);
        assert!(ProbeCommit::parse(&bytes[..20]).is_err());
    }

    #[test]
    fn payload_header_flags() {
        let packet = [12u8, 0b1000_0011, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF];
        let hdr = PayloadHeader::parse(&packet).unwrap();
        assert!(hdr.frame_id());
        assert!(hdr.end_of_frame());
        assert!(!hdr.error());
        assert_eq!(usize::from(hdr.length), 12);
    }

    #[test]
    fn payload_header_rejects_short_packets() {
        assert!(PayloadHeader::parse(&[1]).is_none());
        // header claiming more bytes than the packet holds
        assert!(PayloadHeader::parse(&[9, 0]).is_none());
    }

    #[test]
    fn vc_header_version_detect() {
        let buf = [13u8, 0x24, 0x01, 0x00, 0x01, 13, 0, 0x80, 0x8D, 0x5B, 0x00, 1, 1];
        let h = VcHeader::parse(&buf).unwrap();
        assert_eq!(h.bcd_uvc, 0x0100);
        assert!(h.is_obsolete_1_0());
    }
}
