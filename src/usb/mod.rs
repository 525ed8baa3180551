//! The Universal Serial Bus (USB) wire-format module.
//!
//! Everything in here is a fixed-layout record defined by the USB 2.0 / 3.2
//! specifications or a device-class specification (hub, HID, UVC). Parsing is
//! done through the bounds-checked cursor in [`desc`]; none of these types
//! are read by casting device memory.

pub use self::config::ConfigDescriptor;
pub use self::desc::{decode_header, find_next, DescCursor, DescError};
pub use self::device::DeviceDescriptor;
pub use self::endpoint::{
    EndpointDescriptor, HidDescriptor, SuperSpeedCompanionDescriptor, ENDP_ATTR_TY_MASK,
};
pub use self::hub::{
    HubDescriptorV2, HubDescriptorV3, HubPortFeature, HubPortStatus, HubPortStatusV2,
    HubPortStatusV3,
};
pub use self::interface::{InterfaceAssocDescriptor, InterfaceDescriptor};

pub mod config;
pub mod desc;
pub mod device;
pub mod endpoint;
pub mod hub;
pub mod interface;
pub mod uvc;

/// Descriptor kinds a device can report (USB32 sections 9.5 and 9.6, plus
/// the class-defined kinds used by this crate).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DescriptorKind {
    Device = 1,
    Configuration = 2,
    String = 3,
    Interface = 4,
    Endpoint = 5,
    DeviceQualifier = 6,
    OtherSpeedConfiguration = 7,
    InterfacePower = 8,
    OnTheGo = 9,
    InterfaceAssociation = 11,
    BinaryObjectStorage = 15,
    Hid = 33,
    Hub = 41,
    SuperSpeedHub = 42,
    SuperSpeedCompanion = 48,
}

/// Class-specific descriptor kinds (bits 7:5 = class, per USB common class
/// conventions). UVC uses these for its video control/streaming records.
pub const DESC_KIND_CS_INTERFACE: u8 = 0x24;
pub const DESC_KIND_CS_ENDPOINT: u8 = 0x25;

/// Interface class codes dispatched by the enumerator.
pub mod class_code {
    pub const HID: u8 = 0x03;
    pub const MASS_STORAGE: u8 = 0x08;
    pub const HUB: u8 = 0x09;
    pub const VIDEO: u8 = 0x0E;
    pub const MISCELLANEOUS: u8 = 0xEF;
}

/// Human-readable name for an interface class code. Read-only table, used by
/// `print_info` output only.
pub fn class_name(class: u8) -> &'static str {
    match class {
        0x00 => "per-interface",
        0x01 => "audio",
        0x02 => "cdc-control",
        class_code::HID => "hid",
        0x05 => "physical",
        0x06 => "image",
        0x07 => "printer",
        class_code::MASS_STORAGE => "mass-storage",
        class_code::HUB => "hub",
        0x0A => "cdc-data",
        0x0B => "smart-card",
        0x0D => "content-security",
        class_code::VIDEO => "video",
        0x0F => "personal-healthcare",
        0x10 => "audio-video",
        class_code::MISCELLANEOUS => "miscellaneous",
        0xFE => "application-specific",
        0xFF => "vendor-specific",
        _ => "unknown",
    }
}

/// Standard request codes used through the control pipe (USB32 table 9-5).
#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum SetupReq {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
}

/// Endpoint feature selector for ClearFeature (USB32 table 9-7).
pub const FEATURE_ENDPOINT_HALT: u16 = 0;
