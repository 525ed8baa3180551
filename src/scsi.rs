//! SCSI command descriptor blocks and response layouts.
//!
//! Each command is a typed `#[repr(C, packed)]` struct whose `new` builder
//! stores multi-byte fields big-endian, then gets serialized once into the
//! CBW's 16-byte CDB area. Only the commands the mass-storage driver issues
//! are defined.

use std::mem;

#[repr(u8)]
#[derive(Clone, Copy, Debug)]
pub enum Opcode {
    TestUnitReady = 0x00,
    RequestSense = 0x03,
    Inquiry = 0x12,
    ReadCapacity10 = 0x25,
    Read10 = 0x28,
    Write10 = 0x2A,
    Read16 = 0x88,
    Write16 = 0x8A,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct Inquiry {
    pub opcode: u8,
    /// Bit 0 is EVPD; the rest are reserved or obsolete.
    pub evpd: u8,
    pub page_code: u8,
    /// Big endian.
    pub alloc_len: u16,
    pub control: u8,
}
unsafe impl plain::Plain for Inquiry {}

impl Inquiry {
    pub const fn new(alloc_len: u16) -> Self {
        Self {
            opcode: Opcode::Inquiry as u8,
            evpd: 0,
            page_code: 0,
            alloc_len: u16::to_be(alloc_len),
            control: 0,
        }
    }
}

/// The fixed 36-byte prefix of the standard inquiry data.
pub const STANDARD_INQUIRY_LEN: u16 = 36;

#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct TestUnitReady {
    pub opcode: u8,
    _rsvd: [u8; 4],
    pub control: u8,
}
unsafe impl plain::Plain for TestUnitReady {}

impl TestUnitReady {
    pub const fn new() -> Self {
        Self {
            opcode: Opcode::TestUnitReady as u8,
            _rsvd: [0; 4],
            control: 0,
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct RequestSense {
    pub opcode: u8,
    /// Bit 0 selects descriptor-format sense data.
    pub desc: u8,
    _rsvd: u16,
    pub alloc_len: u8,
    pub control: u8,
}
unsafe impl plain::Plain for RequestSense {}

impl RequestSense {
    pub const fn new(alloc_len: u8) -> Self {
        Self {
            opcode: Opcode::RequestSense as u8,
            desc: 0,
            _rsvd: 0,
            alloc_len,
            control: 0,
        }
    }
}

/// Fixed-format sense data header (SPC-3). Only the key is interpreted.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedFormatSenseData {
    pub response_code: u8,
    _obsolete: u8,
    /// Sense key in bits 3:0.
    pub flags: u8,
    pub info: u32,
    pub add_sense_len: u8,
    pub command_specific_info: u32,
    pub add_sense_code: u8,
    pub add_sense_code_qual: u8,
    pub fru_code: u8,
    pub sense_key_specific: [u8; 3],
}
unsafe impl plain::Plain for FixedFormatSenseData {}

impl FixedFormatSenseData {
    pub const MINIMAL_ALLOC_LEN: u8 = 18;

    pub fn sense_key(&self) -> u8 {
        self.flags & 0x0F
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct ReadCapacity10 {
    pub opcode: u8,
    _rsvd1: u8,
    _obsolete_lba: u32,
    _rsvd2: [u8; 3],
    pub control: u8,
}
unsafe impl plain::Plain for ReadCapacity10 {}

impl ReadCapacity10 {
    pub const fn new() -> Self {
        Self {
            opcode: Opcode::ReadCapacity10 as u8,
            _rsvd1: 0,
            _obsolete_lba: 0,
            _rsvd2: [0; 3],
            control: 0,
        }
    }
}

/// The 8-byte ReadCapacity(10) parameter data; both fields big-endian.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadCapacity10ParamData {
    pub max_lba: u32,
    pub block_len: u32,
}
unsafe impl plain::Plain for ReadCapacity10ParamData {}

impl ReadCapacity10ParamData {
    pub const fn max_lba(&self) -> u32 {
        u32::from_be(self.max_lba)
    }

    pub const fn block_len(&self) -> u32 {
        u32::from_be(self.block_len)
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct Read10 {
    pub opcode: u8,
    pub flags: u8,
    /// Big endian.
    pub lba: u32,
    pub group: u8,
    /// Big endian.
    pub transfer_len: u16,
    pub control: u8,
}
unsafe impl plain::Plain for Read10 {}

impl Read10 {
    pub const fn new(lba: u32, transfer_len: u16) -> Self {
        Self {
            opcode: Opcode::Read10 as u8,
            flags: 0,
            lba: u32::to_be(lba),
            group: 0,
            transfer_len: u16::to_be(transfer_len),
            control: 0,
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct Write10 {
    pub opcode: u8,
    pub flags: u8,
    pub lba: u32,
    pub group: u8,
    pub transfer_len: u16,
    pub control: u8,
}
unsafe impl plain::Plain for Write10 {}

impl Write10 {
    pub const fn new(lba: u32, transfer_len: u16) -> Self {
        Self {
            opcode: Opcode::Write10 as u8,
            flags: 0,
            lba: u32::to_be(lba),
            group: 0,
            transfer_len: u16::to_be(transfer_len),
            control: 0,
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct Read16 {
    pub opcode: u8,
    pub flags: u8,
    /// Big endian.
    pub lba: u64,
    /// Big endian.
    pub transfer_len: u32,
    pub group: u8,
    pub control: u8,
}
unsafe impl plain::Plain for Read16 {}

impl Read16 {
    pub const fn new(lba: u64, transfer_len: u32) -> Self {
        Self {
            opcode: Opcode::Read16 as u8,
            flags: 0,
            lba: u64::to_be(lba),
            transfer_len: u32::to_be(transfer_len),
            group: 0,
            control: 0,
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct Write16 {
    pub opcode: u8,
    pub flags: u8,
    pub lba: u64,
    pub transfer_len: u32,
    pub group: u8,
    pub control: u8,
}
unsafe impl plain::Plain for Write16 {}

impl Write16 {
    pub const fn new(lba: u64, transfer_len: u32) -> Self {
        Self {
            opcode: Opcode::Write16 as u8,
            flags: 0,
            lba: u64::to_be(lba),
            transfer_len: u32::to_be(transfer_len),
            group: 0,
            control: 0,
        }
    }
}

/// Serializes a command into a CDB byte vector.
pub fn cdb_bytes<T: plain::Plain + Copy>(cmd: &T) -> Vec<u8> {
    let mut buf = vec![0u8; mem::size_of::<T>()];
    buf.copy_from_slice(unsafe { plain::as_bytes(cmd) });
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdb_sizes() {
        assert_eq!(mem::size_of::<Inquiry>(), 6);
        assert_eq!(mem::size_of::<TestUnitReady>(), 6);
        assert_eq!(mem::size_of::<RequestSense>(), 6);
        assert_eq!(mem::size_of::<ReadCapacity10>(), 10);
        assert_eq!(mem::size_of::<Read10>(), 10);
        assert_eq!(mem::size_of::<Write10>(), 10);
        assert_eq!(mem::size_of::<Read16>(), 16);
        assert_eq!(mem::size_of::<Write16>(), 16);
        assert_eq!(mem::size_of::<ReadCapacity10ParamData>(), 8);
    }

    #[test]
    fn fields_are_big_endian_on_the_wire() {
        let bytes = cdb_bytes(&Read10::new(0x0102_0304, 0x0506));
        assert_eq!(bytes[0], 0x28);
        assert_eq!(&bytes[2..6], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[7..9], &[0x05, 0x06]);

        let bytes = cdb_bytes(&Read16::new(0x0102_0304_0506_0708, 0x0A0B_0C0D));
        assert_eq!(bytes[0], 0x88);
        assert_eq!(&bytes[2..10], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[10..14], &[0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn capacity_data_decodes_big_endian() {
        let raw = [0x00u8, 0x00, 0x10, 0x00, 0x00, 0x00, 0x02, 0x00];
        let data = plain::from_bytes::<ReadCapacity10ParamData>(&raw).unwrap();
        assert_eq!(data.max_lba(), 0x1000);
        assert_eq!(data.block_len(), 512);
    }
}
