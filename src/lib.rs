//! Host-side USB device-class drivers.
//!
//! The crate sits between a host-controller transport and the device
//! classes built on top of it: descriptors are decoded from raw
//! configuration blobs, endpoints normalized into controller-ready
//! parameters, and enumerated devices dispatched to mass-storage, HID
//! mouse, hub and UVC video drivers. The controller itself is reached
//! through the [`transport::HostTransport`] trait, so the protocol logic
//! here never touches rings or DMA directly.

pub mod class;
pub mod endpoint;
pub mod enumerate;
pub mod ring;
pub mod scsi;
pub mod transport;
pub mod usb;

pub use class::{ClassDriver, Driver, DriverError, DriverProperties};
pub use endpoint::{translate, EndpointInfo, EndpointType, EpDirection, LinkSpeed};
pub use enumerate::{enumerate, enumerate_generic, ConfigTree, DeviceInfo, InterfaceTree};
pub use ring::XferRing;
pub use transport::{
    CompletionCode, DeviceReqData, HostTransport, ReqRecipient, ReqTy, Transfer, TransportError,
};
