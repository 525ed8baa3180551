//! Mass-storage class driver speaking the Bulk-Only Transport.
//!
//! Every command is one CBW/data/CSW exchange on the interface's bulk
//! endpoint pair. The CBW is always exactly 31 bytes and the CSW exactly 13;
//! both carry fixed little-endian signatures and a matching tag.

use log::{debug, info, warn};

use crate::class::{ClassDriver, DriverError, DriverProperties, Result};
use crate::endpoint::{translate, EndpointInfo, EpDirection, LinkSpeed};
use crate::enumerate::InterfaceTree;
use crate::scsi::{
    cdb_bytes, FixedFormatSenseData, Inquiry, Read10, Read16, ReadCapacity10,
    ReadCapacity10ParamData, RequestSense, TestUnitReady, Write10, Write16,
    STANDARD_INQUIRY_LEN,
};
use crate::transport::{CompletionCode, HostTransport, Transfer, TransportError};
use crate::usb::class_code;

pub const CBW_SIGNATURE: u32 = 0x4342_5355;
pub const CSW_SIGNATURE: u32 = 0x5342_5355;
pub const CBW_LEN: usize = 31;
pub const CSW_LEN: usize = 13;

const CBW_FLAG_DATA_IN: u8 = 0x80;

/// Interval of one blocking wait slice.
const WAIT_STEP_MS: u32 = 100;
/// Slices before a bulk transfer is declared wedged.
const WAIT_ATTEMPTS: u32 = 50;

#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct CommandBlockWrapper {
    signature: u32,
    tag: u32,
    data_transfer_len: u32,
    flags: u8,
    lun: u8,
    cb_len: u8,
    command_block: [u8; 16],
}
unsafe impl plain::Plain for CommandBlockWrapper {}

impl CommandBlockWrapper {
    pub fn new(tag: u32, data_transfer_len: u32, data_in: bool, lun: u8, cdb: &[u8]) -> Result<Self> {
        if cdb.is_empty() || cdb.len() > 16 {
            return Err(DriverError::InvalidParam("command block must be 1..=16 bytes"));
        }
        let mut command_block = [0u8; 16];
        command_block[..cdb.len()].copy_from_slice(cdb);
        Ok(Self {
            signature: CBW_SIGNATURE.to_le(),
            tag: tag.to_le(),
            data_transfer_len: data_transfer_len.to_le(),
            flags: if data_in { CBW_FLAG_DATA_IN } else { 0 },
            lun,
            cb_len: cdb.len() as u8,
            command_block,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let bytes = unsafe { plain::as_bytes(self) };
        debug_assert_eq!(bytes.len(), CBW_LEN);
        bytes.to_vec()
    }
}

#[derive(Clone, Copy, Debug, Default)]
#[repr(C, packed)]
struct CommandStatusWrapper {
    signature: u32,
    tag: u32,
    data_residue: u32,
    status: u8,
}
unsafe impl plain::Plain for CommandStatusWrapper {}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CswStatus {
    Passed,
    Failed,
    PhaseError,
    Reserved(u8),
}

impl CswStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Passed,
            1 => Self::Failed,
            2 => Self::PhaseError,
            other => Self::Reserved(other),
        }
    }
}

/// Outcome of one completed CBW/data/CSW exchange.
#[derive(Debug)]
pub struct CommandResult {
    pub status: CswStatus,
    pub residue: u32,
    /// Bytes actually moved in the data phase.
    pub bytes: u32,
    /// Data-phase buffer for inbound commands.
    pub data: Option<Vec<u8>>,
}

enum DataPhase {
    In(usize),
    Out(Vec<u8>),
    None,
}

#[derive(Clone, Copy)]
enum InitStep {
    Inquiry,
    TestUnitReady,
    RequestSense,
    ReadCapacity,
}

/// Per-device bring-up orderings. Some sticks reject ReadCapacity until a
/// TestUnitReady/RequestSense round has cleared their unit-attention state,
/// others stall on an early TestUnitReady, so the orderings are tried as
/// data until one completes.
const INIT_SEQUENCES: [&[InitStep]; 3] = [
    &[InitStep::Inquiry, InitStep::TestUnitReady, InitStep::ReadCapacity],
    &[
        InitStep::Inquiry,
        InitStep::TestUnitReady,
        InitStep::RequestSense,
        InitStep::TestUnitReady,
        InitStep::ReadCapacity,
    ],
    &[
        InitStep::TestUnitReady,
        InitStep::RequestSense,
        InitStep::Inquiry,
        InitStep::TestUnitReady,
        InitStep::ReadCapacity,
    ],
];

pub struct MassStorage {
    interface_num: u8,
    bulk_in: EndpointInfo,
    bulk_out: EndpointInfo,
    next_tag: u32,
    lun: u8,
    max_lun: u8,
    /// `(max_lba, block_size)`, cached by `init` from ReadCapacity.
    capacity: Option<(u64, u32)>,
}

impl MassStorage {
    /// Picks the interface's bulk endpoint pair. Missing either direction is
    /// fatal; surplus bulk endpoints are ignored with a warning.
    pub fn bind(
        iface: &InterfaceTree,
        usb_version: u16,
        speed: LinkSpeed,
    ) -> Result<(Self, Vec<EndpointInfo>)> {
        let mut bulk_in = None;
        let mut bulk_out = None;
        let mut surplus = 0usize;

        for (desc, companion) in &iface.endpoints {
            let info = translate(desc, companion.as_ref(), usb_version, speed);
            if !info.ty.is_bulk() {
                continue;
            }
            let slot = match info.direction {
                EpDirection::In => &mut bulk_in,
                EpDirection::Out => &mut bulk_out,
                EpDirection::Bidirectional => continue,
            };
            if slot.is_some() {
                surplus += 1;
            } else {
                *slot = Some(info);
            }
        }
        if surplus > 0 {
            warn!("mass-storage interface exposes {} surplus bulk endpoints", surplus);
        }

        let bulk_in = bulk_in.ok_or(DriverError::Protocol("no bulk-in endpoint"))?;
        let bulk_out = bulk_out.ok_or(DriverError::Protocol("no bulk-out endpoint"))?;
        let endpoints = vec![bulk_out, bulk_in];

        Ok((
            Self {
                interface_num: iface.desc.number,
                bulk_in,
                bulk_out,
                next_tag: 1,
                lun: 0,
                max_lun: 0,
                capacity: None,
            },
            endpoints,
        ))
    }

    pub fn max_lba(&self) -> Result<u64> {
        self.capacity.map(|(lba, _)| lba).ok_or(DriverError::NotInitialized)
    }

    pub fn block_size(&self) -> Result<u32> {
        self.capacity.map(|(_, len)| len).ok_or(DriverError::NotInitialized)
    }

    fn wait_retired(
        xfer: &mut dyn HostTransport,
        ep_num: u8,
        direction: EpDirection,
    ) -> Result<Transfer> {
        for _ in 0..WAIT_ATTEMPTS {
            if let Some(transfer) = xfer.wait(ep_num, direction, WAIT_STEP_MS)? {
                return Ok(transfer);
            }
        }
        Err(DriverError::Protocol("bulk transfer did not retire in time"))
    }

    /// Bulk-Only Mass Storage Reset followed by clearing both bulk halts.
    pub fn reset_recovery(&mut self, xfer: &mut dyn HostTransport) -> Result<()> {
        warn!("mass-storage reset recovery on interface {}", self.interface_num);
        xfer.mass_storage_reset(u16::from(self.interface_num))?;
        xfer.clear_halt(self.bulk_in.ep_num, EpDirection::In)?;
        xfer.clear_halt(self.bulk_out.ep_num, EpDirection::Out)?;
        Ok(())
    }

    fn send_cbw(&mut self, xfer: &mut dyn HostTransport, cbw: &CommandBlockWrapper) -> Result<()> {
        let mut recovered = false;
        loop {
            xfer.submit_out(self.bulk_out.ep_num, cbw.to_bytes())?;
            let transfer = Self::wait_retired(xfer, self.bulk_out.ep_num, EpDirection::Out)?;
            match transfer.code {
                CompletionCode::Success => return Ok(()),
                CompletionCode::Stall if !recovered => {
                    // One recovery attempt; a stalled CBW after reset
                    // recovery means the device rejects the protocol.
                    self.reset_recovery(xfer)?;
                    recovered = true;
                }
                code => return Err(DriverError::Hardware(code)),
            }
        }
    }

    fn read_csw(&mut self, xfer: &mut dyn HostTransport, tag: u32) -> Result<CommandStatusWrapper> {
        let mut retried = false;
        loop {
            xfer.submit_in(self.bulk_in.ep_num, vec![0u8; CSW_LEN])?;
            let transfer = Self::wait_retired(xfer, self.bulk_in.ep_num, EpDirection::In)?;
            match transfer.code {
                CompletionCode::Success | CompletionCode::ShortPacket => {
                    if (transfer.bytes as usize) < CSW_LEN {
                        self.reset_recovery(xfer)?;
                        return Err(DriverError::Protocol("truncated CSW"));
                    }
                    let mut csw = CommandStatusWrapper::default();
                    plain::copy_from_bytes(&mut csw, &transfer.buffer[..CSW_LEN])
                        .map_err(|_| DriverError::Protocol("CSW buffer too small"))?;
                    if u32::from_le(csw.signature) != CSW_SIGNATURE
                        || u32::from_le(csw.tag) != tag
                    {
                        self.reset_recovery(xfer)?;
                        return Err(DriverError::Protocol("CSW signature or tag mismatch"));
                    }
                    return Ok(csw);
                }
                CompletionCode::Stall if !retried => {
                    xfer.clear_halt(self.bulk_in.ep_num, EpDirection::In)?;
                    retried = true;
                }
                code => return Err(DriverError::Hardware(code)),
            }
        }
    }

    fn send_command(
        &mut self,
        xfer: &mut dyn HostTransport,
        cdb: &[u8],
        data: DataPhase,
    ) -> Result<CommandResult> {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);

        let (data_len, data_in) = match &data {
            DataPhase::In(len) => (*len as u32, true),
            DataPhase::Out(buf) => (buf.len() as u32, false),
            DataPhase::None => (0, false),
        };
        let cbw = CommandBlockWrapper::new(tag, data_len, data_in, self.lun, cdb)?;
        self.send_cbw(xfer, &cbw)?;

        let mut bytes = 0u32;
        let mut payload = None;
        match data {
            DataPhase::In(len) => {
                xfer.submit_in(self.bulk_in.ep_num, vec![0u8; len])?;
                let transfer = Self::wait_retired(xfer, self.bulk_in.ep_num, EpDirection::In)?;
                match transfer.code {
                    code if code.has_data() => {
                        bytes = transfer.bytes;
                        payload = Some(transfer.buffer);
                    }
                    CompletionCode::Stall => {
                        // Recoverable at the call site: the halt is cleared
                        // and the CSW consumed, but the command failed.
                        xfer.clear_halt(self.bulk_in.ep_num, EpDirection::In)?;
                        let _ = self.read_csw(xfer, tag);
                        return Err(DriverError::Hardware(CompletionCode::Stall));
                    }
                    code => return Err(DriverError::Hardware(code)),
                }
            }
            DataPhase::Out(buf) => {
                xfer.submit_out(self.bulk_out.ep_num, buf)?;
                let transfer = Self::wait_retired(xfer, self.bulk_out.ep_num, EpDirection::Out)?;
                match transfer.code {
                    CompletionCode::Success => bytes = transfer.bytes,
                    CompletionCode::Stall => {
                        xfer.clear_halt(self.bulk_out.ep_num, EpDirection::Out)?;
                        let _ = self.read_csw(xfer, tag);
                        return Err(DriverError::Hardware(CompletionCode::Stall));
                    }
                    code => return Err(DriverError::Hardware(code)),
                }
            }
            DataPhase::None => {}
        }

        let csw = self.read_csw(xfer, tag)?;
        let status = CswStatus::from_raw(csw.status);
        if status == CswStatus::PhaseError {
            self.reset_recovery(xfer)?;
            return Err(DriverError::Protocol("BOT phase error"));
        }
        Ok(CommandResult {
            status,
            residue: u32::from_le(csw.data_residue),
            bytes,
            data: payload,
        })
    }

    fn run_init_step(&mut self, xfer: &mut dyn HostTransport, step: InitStep) -> Result<()> {
        match step {
            InitStep::Inquiry => {
                let cmd = Inquiry::new(STANDARD_INQUIRY_LEN);
                let res = self.send_command(
                    xfer,
                    &cdb_bytes(&cmd),
                    DataPhase::In(STANDARD_INQUIRY_LEN as usize),
                )?;
                if res.status != CswStatus::Passed {
                    return Err(DriverError::Protocol("inquiry failed"));
                }
                if let Some(data) = &res.data {
                    if data.len() >= 32 {
                        info!(
                            "inquiry: vendor {:?} product {:?}",
                            String::from_utf8_lossy(&data[8..16]).trim_end(),
                            String::from_utf8_lossy(&data[16..32]).trim_end(),
                        );
                    }
                }
            }
            InitStep::TestUnitReady => {
                let cmd = TestUnitReady::new();
                let res = self.send_command(xfer, &cdb_bytes(&cmd), DataPhase::None)?;
                if res.status != CswStatus::Passed {
                    return Err(DriverError::Protocol("unit not ready"));
                }
            }
            InitStep::RequestSense => {
                let alloc = FixedFormatSenseData::MINIMAL_ALLOC_LEN;
                let cmd = RequestSense::new(alloc);
                let res =
                    self.send_command(xfer, &cdb_bytes(&cmd), DataPhase::In(alloc as usize))?;
                if let Some(data) = &res.data {
                    let mut sense = FixedFormatSenseData::default();
                    if plain::copy_from_bytes(&mut sense, data).is_ok() {
                        debug!("request sense: key {:#x}", sense.sense_key());
                    }
                }
            }
            InitStep::ReadCapacity => {
                let cmd = ReadCapacity10::new();
                let res = self.send_command(xfer, &cdb_bytes(&cmd), DataPhase::In(8))?;
                if res.status != CswStatus::Passed {
                    return Err(DriverError::Protocol("read capacity failed"));
                }
                let data = res.data.as_deref().unwrap_or(&[]);
                let mut param = ReadCapacity10ParamData::default();
                plain::copy_from_bytes(&mut param, data)
                    .map_err(|_| DriverError::Protocol("short read-capacity data"))?;
                self.capacity = Some((u64::from(param.max_lba()), param.block_len()));
            }
        }
        Ok(())
    }

    fn check_io(&self, lba: u64, count: u64) -> Result<u32> {
        let (max_lba, block_size) = self.capacity.ok_or(DriverError::NotInitialized)?;
        let end = lba
            .checked_add(count)
            .ok_or(DriverError::InvalidParam("LBA range overflows"))?;
        if count == 0 || end > max_lba + 1 {
            return Err(DriverError::InvalidParam("LBA range beyond device capacity"));
        }
        Ok(block_size)
    }

    // The CBW carries the data-phase length in a u32, so transfers past
    // 4 GiB are unrepresentable on the wire.
    fn transfer_len(count: u64, block_size: u32) -> Result<usize> {
        let len = count
            .checked_mul(u64::from(block_size))
            .ok_or(DriverError::InvalidParam("transfer length overflows"))?;
        u32::try_from(len)
            .map(|l| l as usize)
            .map_err(|_| DriverError::InvalidParam("transfer length exceeds 4 GiB"))
    }

    pub fn read10(&mut self, xfer: &mut dyn HostTransport, lba: u32, count: u16) -> Result<Vec<u8>> {
        let block_size = self.check_io(u64::from(lba), u64::from(count))?;
        let cmd = Read10::new(lba, count);
        let len = Self::transfer_len(u64::from(count), block_size)?;
        let res = self.send_command(xfer, &cdb_bytes(&cmd), DataPhase::In(len))?;
        if res.status != CswStatus::Passed {
            return Err(DriverError::Protocol("read(10) failed"));
        }
        res.data.ok_or(DriverError::Protocol("read(10) returned no data"))
    }

    pub fn write10(
        &mut self,
        xfer: &mut dyn HostTransport,
        lba: u32,
        data: Vec<u8>,
    ) -> Result<()> {
        let block_size = self.block_size()?;
        if data.is_empty() || data.len() % block_size as usize != 0 {
            return Err(DriverError::InvalidParam("write length not a multiple of the block size"));
        }
        let count = data.len() / block_size as usize;
        if count > 0xFFFF {
            return Err(DriverError::InvalidParam("write(10) limited to 0xFFFF sectors"));
        }
        self.check_io(u64::from(lba), count as u64)?;
        let cmd = Write10::new(lba, count as u16);
        let res = self.send_command(xfer, &cdb_bytes(&cmd), DataPhase::Out(data))?;
        if res.status != CswStatus::Passed {
            return Err(DriverError::Protocol("write(10) failed"));
        }
        Ok(())
    }

    pub fn read16(
        &mut self,
        xfer: &mut dyn HostTransport,
        lba: u64,
        count: u32,
    ) -> Result<Vec<u8>> {
        let block_size = self.check_io(lba, u64::from(count))?;
        let cmd = Read16::new(lba, count);
        let len = Self::transfer_len(u64::from(count), block_size)?;
        let res = self.send_command(xfer, &cdb_bytes(&cmd), DataPhase::In(len))?;
        if res.status != CswStatus::Passed {
            return Err(DriverError::Protocol("read(16) failed"));
        }
        res.data.ok_or(DriverError::Protocol("read(16) returned no data"))
    }

    pub fn write16(
        &mut self,
        xfer: &mut dyn HostTransport,
        lba: u64,
        data: Vec<u8>,
    ) -> Result<()> {
        let block_size = self.block_size()?;
        if data.is_empty() || data.len() % block_size as usize != 0 {
            return Err(DriverError::InvalidParam("write length not a multiple of the block size"));
        }
        let count = (data.len() / block_size as usize) as u64;
        self.check_io(lba, count)?;
        let cmd = Write16::new(lba, count as u32);
        let res = self.send_command(xfer, &cdb_bytes(&cmd), DataPhase::Out(data))?;
        if res.status != CswStatus::Passed {
            return Err(DriverError::Protocol("write(16) failed"));
        }
        Ok(())
    }
}

impl ClassDriver for MassStorage {
    fn init(&mut self, xfer: &mut dyn HostTransport) -> Result<()> {
        // Devices without multiple LUNs stall Get Max LUN; treat that as 0.
        self.max_lun = match xfer.get_max_lun(u16::from(self.interface_num)) {
            Ok(n) => n,
            Err(TransportError::Hardware(CompletionCode::Stall))
            | Err(TransportError::Rejected(_)) => 0,
            Err(e) => return Err(e.into()),
        };
        self.lun = 0;

        let mut last_err = DriverError::Protocol("no init sequence attempted");
        for (i, seq) in INIT_SEQUENCES.iter().enumerate() {
            debug!("mass-storage init sequence {}", i);
            match seq.iter().try_for_each(|&step| self.run_init_step(xfer, step)) {
                Ok(()) => {
                    let (max_lba, block_size) = self.capacity.unwrap_or((0, 0));
                    info!(
                        "mass-storage ready: {} blocks of {} bytes, max lun {}",
                        max_lba as u128 + 1,
                        block_size,
                        self.max_lun
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!("mass-storage init sequence {} failed: {}", i, e);
                    self.capacity = None;
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn print_info(&self) {
        match self.capacity {
            Some((max_lba, block_size)) => info!(
                "mass-storage device: {} MiB ({} byte blocks)",
                (u128::from(max_lba) + 1) * u128::from(block_size) / (1024 * 1024),
                block_size
            ),
            None => info!("mass-storage device (uninitialized)"),
        }
    }

    fn properties(&self) -> DriverProperties {
        DriverProperties {
            name: "mass-storage",
            interface_class: class_code::MASS_STORAGE,
            block_size: self.capacity.map(|(_, b)| b),
            max_lba: self.capacity.map(|(l, _)| l),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbw_wire_layout() {
        let cbw = CommandBlockWrapper::new(7, 512, true, 0, &[0x28, 0, 0, 0, 0, 1, 0, 0, 1, 0])
            .unwrap();
        let bytes = cbw.to_bytes();
        assert_eq!(bytes.len(), CBW_LEN);
        // "USBC" little-endian at offset 0.
        assert_eq!(&bytes[0..4], &[0x55, 0x53, 0x42, 0x43]);
        assert_eq!(&bytes[4..8], &7u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &512u32.to_le_bytes());
        assert_eq!(bytes[12], 0x80);
        assert_eq!(bytes[13], 0);
        assert_eq!(bytes[14], 10);
        assert_eq!(bytes[15], 0x28);
        // CDB padded with zeros out to 16 bytes.
        assert!(bytes[16 + 9..].iter().all(|&b| b == 0));
    }

    #[test]
    fn cbw_rejects_oversized_cdb() {
        assert!(CommandBlockWrapper::new(1, 0, false, 0, &[0u8; 17]).is_err());
        assert!(CommandBlockWrapper::new(1, 0, false, 0, &[]).is_err());
    }

    #[test]
    fn transfer_len_is_checked() {
        assert_eq!(MassStorage::transfer_len(8, 512).unwrap(), 4096);
        // 0xFFFF sectors of a bogus 1 MiB block length is past the u32
        // wire field; it must fail instead of wrapping.
        assert!(MassStorage::transfer_len(0xFFFF, 1 << 20).is_err());
        assert!(MassStorage::transfer_len(u64::MAX, u32::MAX).is_err());
    }

    #[test]
    fn csw_status_mapping() {
        assert_eq!(CswStatus::from_raw(0), CswStatus::Passed);
        assert_eq!(CswStatus::from_raw(1), CswStatus::Failed);
        assert_eq!(CswStatus::from_raw(2), CswStatus::PhaseError);
        assert_eq!(CswStatus::from_raw(9), CswStatus::Reserved(9));
    }
}
