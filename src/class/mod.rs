//! Device-class drivers.
//!
//! One driver instance exists per enumerated device slot, owned by the
//! enumeration caller and dropped on device removal (dropping releases every
//! buffer the driver holds, including the video driver's fragment pool).

use std::fmt;

use thiserror::Error;

use crate::ring::RingError;
use crate::transport::{CompletionCode, HostTransport, TransportError};
use crate::usb::DescError;

pub mod hid;
pub mod hub;
pub mod storage;
pub mod video;

pub use hid::HidMouse;
pub use hub::Hub;
pub use storage::MassStorage;
pub use video::Video;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("descriptor error: {0}")]
    Desc(#[from] DescError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    #[error("hardware status: {}", .0.as_str())]
    Hardware(CompletionCode),

    #[error("protocol error: {0}")]
    Protocol(&'static str),

    #[error("driver not initialized")]
    NotInitialized,

    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),
}

pub type Result<T, E = DriverError> = core::result::Result<T, E>;

/// Facts a driver exposes without touching the device.
#[derive(Clone, Copy, Debug, Default)]
pub struct DriverProperties {
    pub name: &'static str,
    pub interface_class: u8,
    /// Mass storage: cached sector size.
    pub block_size: Option<u32>,
    /// Mass storage: cached highest addressable LBA.
    pub max_lba: Option<u64>,
    /// Hub: downstream port count.
    pub ports: Option<u8>,
    /// Video: negotiated maximum frame size.
    pub max_frame_size: Option<u32>,
}

/// The capability set every class driver implements.
pub trait ClassDriver {
    /// Brings the device function up after its endpoints were configured.
    fn init(&mut self, xfer: &mut dyn HostTransport) -> Result<()>;

    /// Logs a human-readable summary of the bound function.
    fn print_info(&self);

    fn properties(&self) -> DriverProperties;
}

/// A device whose class needs no protocol logic; its endpoints are
/// configured generically and `init` has nothing left to do.
#[derive(Debug)]
pub struct ConfigurableGeneric {
    pub interface_class: u8,
    pub endpoint_count: usize,
}

impl ClassDriver for ConfigurableGeneric {
    fn init(&mut self, _xfer: &mut dyn HostTransport) -> Result<()> {
        Ok(())
    }

    fn print_info(&self) {
        log::info!(
            "generic {} device with {} endpoints",
            crate::usb::class_name(self.interface_class),
            self.endpoint_count
        );
    }

    fn properties(&self) -> DriverProperties {
        DriverProperties {
            name: "generic",
            interface_class: self.interface_class,
            ..Default::default()
        }
    }
}

/// The tagged driver variant returned by the enumeration factory.
pub enum Driver {
    MassStorage(MassStorage),
    Hid(HidMouse),
    Hub(Hub),
    Video(Video),
    Generic(ConfigurableGeneric),
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

impl Driver {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MassStorage(_) => "mass-storage",
            Self::Hid(_) => "hid",
            Self::Hub(_) => "hub",
            Self::Video(_) => "video",
            Self::Generic(_) => "generic",
        }
    }

    fn inner(&self) -> &dyn ClassDriver {
        match self {
            Self::MassStorage(d) => d,
            Self::Hid(d) => d,
            Self::Hub(d) => d,
            Self::Video(d) => d,
            Self::Generic(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ClassDriver {
        match self {
            Self::MassStorage(d) => d,
            Self::Hid(d) => d,
            Self::Hub(d) => d,
            Self::Video(d) => d,
            Self::Generic(d) => d,
        }
    }
}

impl ClassDriver for Driver {
    fn init(&mut self, xfer: &mut dyn HostTransport) -> Result<()> {
        self.inner_mut().init(xfer)
    }

    fn print_info(&self) {
        self.inner().print_info()
    }

    fn properties(&self) -> DriverProperties {
        self.inner().properties()
    }
}
