//! The host transport interface.
//!
//! Everything below the class drivers (the controller's command/transfer
//! rings, DMA, address assignment) lives behind this trait. Class drivers
//! only consume a generic three-stage control transfer, endpoint
//! configuration, and the non-blocking-submit / blocking-wait transfer
//! primitives. One logical reader drives each endpoint, so submit-then-wait
//! ordering is the only synchronization: a submitted buffer is owned by the
//! transport until `wait` hands it back.

use thiserror::Error;

use crate::endpoint::{EndpointInfo, EpDirection, LinkSpeed};
use crate::usb::hub::{HubPortFeature, HubPortStatus};
use crate::usb::{DescriptorKind, SetupReq, FEATURE_ENDPOINT_HALT};

#[derive(Clone, Copy, Debug)]
pub enum ReqTy {
    Standard,
    Class,
    Vendor,
}

#[derive(Clone, Copy, Debug)]
pub enum ReqRecipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Data stage of a control transfer.
pub enum DeviceReqData<'a> {
    In(&'a mut [u8]),
    Out(&'a [u8]),
    NoData,
}

impl DeviceReqData<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::In(buf) => buf.len(),
            Self::Out(buf) => buf.len(),
            Self::NoData => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Completion code reported for one transfer descriptor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CompletionCode {
    Success,
    ShortPacket,
    Stall,
    Babble,
    MissedService,
    RingOverrun,
    /// Any other controller-specific code.
    Error(u8),
}

impl CompletionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ShortPacket => "short-packet",
            Self::Stall => "stall",
            Self::Babble => "babble",
            Self::MissedService => "missed-service",
            Self::RingOverrun => "ring-overrun",
            Self::Error(_) => "error",
        }
    }

    /// Success or a short packet; both carry valid data up to `bytes`.
    pub fn has_data(&self) -> bool {
        matches!(self, Self::Success | Self::ShortPacket)
    }
}

/// One retired transfer: its completion code, the byte count actually
/// moved, and the buffer the transport took ownership of at submit time.
#[derive(Debug)]
pub struct Transfer {
    pub code: CompletionCode,
    pub bytes: u32,
    pub buffer: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("control request rejected: {0}")]
    Rejected(&'static str),

    #[error("transfer failed ({})", .0.as_str())]
    Hardware(CompletionCode),

    #[error("no such endpoint {0}")]
    NoSuchEndpoint(u8),

    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

/// The seam between the class drivers and the host controller.
///
/// Required methods map one-to-one onto the controller's primitives; the
/// provided methods are the standard/class control requests every driver
/// shares, expressed over `device_request`.
pub trait HostTransport {
    /// Generic three-stage control transfer on the default pipe.
    fn device_request(
        &mut self,
        ty: ReqTy,
        recipient: ReqRecipient,
        request: u8,
        value: u16,
        index: u16,
        data: DeviceReqData<'_>,
    ) -> Result<()>;

    /// Programs the controller's endpoint contexts for this device. Hub
    /// devices pass their downstream port count. Must follow
    /// [`Self::evaluate_context`].
    fn configure_endpoints(
        &mut self,
        endpoints: &[EndpointInfo],
        hub_ports: Option<u8>,
    ) -> Result<()>;

    /// Negotiates exit-latency hints with the controller; required before
    /// endpoint configuration takes effect.
    fn evaluate_context(&mut self, max_exit_latency: u16) -> Result<()>;

    /// Queues one receive transfer descriptor. Non-blocking; the transport
    /// owns `buffer` until [`Self::wait`] returns it.
    fn submit_in(&mut self, ep_num: u8, buffer: Vec<u8>) -> Result<()>;

    /// Queues one send transfer descriptor. Non-blocking.
    fn submit_out(&mut self, ep_num: u8, buffer: Vec<u8>) -> Result<()>;

    /// Blocks until the oldest in-flight transfer on the endpoint retires or
    /// `timeout_ms` elapses; `Ok(None)` means it is still pending.
    fn wait(&mut self, ep_num: u8, direction: EpDirection, timeout_ms: u32)
        -> Result<Option<Transfer>>;

    /// Cancels and reclaims every in-flight transfer on the endpoint,
    /// returning how many were reclaimed.
    fn cancel(&mut self, ep_num: u8, direction: EpDirection) -> Result<usize>;

    /// The device's position within nested hubs, 4 bits per tier.
    fn route_string(&self) -> u32;

    /// Negotiated link speed of this device.
    fn link_speed(&self) -> LinkSpeed;

    // --- provided standard requests ---

    fn get_descriptor(
        &mut self,
        recipient: ReqRecipient,
        kind: u8,
        index: u8,
        windex: u16,
        buf: &mut [u8],
    ) -> Result<()> {
        self.device_request(
            ReqTy::Standard,
            recipient,
            SetupReq::GetDescriptor as u8,
            (u16::from(kind) << 8) | u16::from(index),
            windex,
            DeviceReqData::In(buf),
        )
    }

    /// Fetches and decodes a UTF-16LE string descriptor (language 0x0409).
    fn get_string(&mut self, index: u8) -> Result<String> {
        let mut buf = [0u8; 256];
        self.get_descriptor(
            ReqRecipient::Device,
            DescriptorKind::String as u8,
            index,
            0x0409,
            &mut buf[..2],
        )?;
        let len = usize::from(buf[0]).min(buf.len());
        if len < 2 {
            return Err(TransportError::Rejected("empty string descriptor"));
        }
        self.get_descriptor(
            ReqRecipient::Device,
            DescriptorKind::String as u8,
            index,
            0x0409,
            &mut buf[..len],
        )?;
        let units = buf[2..len]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect::<Vec<u16>>();
        Ok(String::from_utf16_lossy(&units))
    }

    fn set_configuration(&mut self, value: u8) -> Result<()> {
        self.device_request(
            ReqTy::Standard,
            ReqRecipient::Device,
            SetupReq::SetConfiguration as u8,
            u16::from(value),
            0,
            DeviceReqData::NoData,
        )
    }

    fn set_interface(&mut self, interface: u8, alternate_setting: u8) -> Result<()> {
        self.device_request(
            ReqTy::Standard,
            ReqRecipient::Interface,
            SetupReq::SetInterface as u8,
            u16::from(alternate_setting),
            u16::from(interface),
            DeviceReqData::NoData,
        )
    }

    /// ClearFeature(ENDPOINT_HALT) on the endpoint's address.
    fn clear_halt(&mut self, ep_num: u8, direction: EpDirection) -> Result<()> {
        let address = match direction {
            EpDirection::In => u16::from(ep_num) | 0x80,
            _ => u16::from(ep_num),
        };
        self.device_request(
            ReqTy::Standard,
            ReqRecipient::Endpoint,
            SetupReq::ClearFeature as u8,
            FEATURE_ENDPOINT_HALT,
            address,
            DeviceReqData::NoData,
        )
    }

    // --- provided mass-storage class requests ---

    fn mass_storage_reset(&mut self, interface: u16) -> Result<()> {
        self.device_request(
            ReqTy::Class,
            ReqRecipient::Interface,
            0xFF,
            0,
            interface,
            DeviceReqData::NoData,
        )
    }

    fn get_max_lun(&mut self, interface: u16) -> Result<u8> {
        let mut lun = [0u8; 1];
        self.device_request(
            ReqTy::Class,
            ReqRecipient::Interface,
            0xFE,
            0,
            interface,
            DeviceReqData::In(&mut lun),
        )?;
        Ok(lun[0])
    }

    // --- provided hub class requests ---

    fn hub_descriptor(&mut self, kind: u8, buf: &mut [u8]) -> Result<()> {
        self.device_request(
            ReqTy::Class,
            ReqRecipient::Device,
            SetupReq::GetDescriptor as u8,
            u16::from(kind) << 8,
            0,
            DeviceReqData::In(buf),
        )
    }

    fn set_hub_depth(&mut self, depth: u8) -> Result<()> {
        // SET_HUB_DEPTH, SuperSpeed hubs only.
        self.device_request(
            ReqTy::Class,
            ReqRecipient::Device,
            0x0C,
            u16::from(depth),
            0,
            DeviceReqData::NoData,
        )
    }

    /// SetPortFeature; `selector` rides in the high byte of wIndex (used by
    /// PORT_TEST for the test pattern).
    fn set_port_feature(&mut self, port: u8, feature: HubPortFeature, selector: u8) -> Result<()> {
        self.device_request(
            ReqTy::Class,
            ReqRecipient::Other,
            SetupReq::SetFeature as u8,
            feature as u16,
            (u16::from(selector) << 8) | u16::from(port),
            DeviceReqData::NoData,
        )
    }

    fn clear_port_feature(&mut self, port: u8, feature: HubPortFeature) -> Result<()> {
        self.device_request(
            ReqTy::Class,
            ReqRecipient::Other,
            SetupReq::ClearFeature as u8,
            feature as u16,
            u16::from(port),
            DeviceReqData::NoData,
        )
    }

    fn port_status(&mut self, port: u8, usb3: bool) -> Result<HubPortStatus> {
        let mut buf = [0u8; 4];
        self.device_request(
            ReqTy::Class,
            ReqRecipient::Other,
            SetupReq::GetStatus as u8,
            0,
            u16::from(port),
            DeviceReqData::In(&mut buf),
        )?;
        Ok(HubPortStatus::from_wire(buf, usb3))
    }
}
