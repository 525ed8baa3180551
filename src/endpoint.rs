//! Endpoint translator.
//!
//! Normalizes a raw endpoint descriptor (plus an optional SuperSpeed
//! companion) into the transport-neutral [`EndpointInfo`] the host interface
//! consumes: an 8-way transfer type, a service interval expressed uniformly
//! as a 125 µs-frame power-of-two exponent, and the merged companion fields.

use crate::usb::endpoint::{EndpointDescriptor, SuperSpeedCompanionDescriptor};

/// Negotiated link speed of the device the endpoint belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LinkSpeed {
    Low,
    Full,
    High,
    Super,
    SuperPlus,
}

impl LinkSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low-speed",
            Self::Full => "full-speed",
            Self::High => "high-speed",
            Self::Super => "super-speed",
            Self::SuperPlus => "super-speed-plus",
        }
    }

    pub fn is_super(&self) -> bool {
        matches!(self, Self::Super | Self::SuperPlus)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EpDirection {
    Out,
    In,
    Bidirectional,
}

/// Endpoint transfer types, numbered the way the host controller's endpoint
/// contexts encode them (OUT 1-3, control 4, IN 5-7).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum EndpointType {
    IsochOut = 1,
    BulkOut = 2,
    InterruptOut = 3,
    Control = 4,
    IsochIn = 5,
    BulkIn = 6,
    InterruptIn = 7,
}

impl EndpointType {
    /// Maps the descriptor's transfer-type bits and direction bit.
    pub fn from_raw(transfer_type_bits: u8, is_in: bool) -> Self {
        match (transfer_type_bits & 0x3, is_in) {
            (0, _) => Self::Control,
            (1, false) => Self::IsochOut,
            (2, false) => Self::BulkOut,
            (3, false) => Self::InterruptOut,
            (1, true) => Self::IsochIn,
            (2, true) => Self::BulkIn,
            (3, true) => Self::InterruptIn,
            _ => unreachable!(),
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(
            self,
            Self::IsochOut | Self::IsochIn | Self::InterruptOut | Self::InterruptIn
        )
    }

    pub fn is_isoch(&self) -> bool {
        matches!(self, Self::IsochOut | Self::IsochIn)
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::BulkOut | Self::BulkIn)
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::InterruptOut | Self::InterruptIn)
    }

    pub fn direction(&self) -> EpDirection {
        match self {
            Self::Control => EpDirection::Bidirectional,
            Self::IsochOut | Self::BulkOut | Self::InterruptOut => EpDirection::Out,
            Self::IsochIn | Self::BulkIn | Self::InterruptIn => EpDirection::In,
        }
    }
}

/// A normalized endpoint, ready to hand to the host transport.
#[derive(Clone, Copy, Debug)]
pub struct EndpointInfo {
    pub ep_num: u8,
    pub direction: EpDirection,
    pub ty: EndpointType,
    pub sync_ty: u8,
    pub usage_ty: u8,
    /// Base packet size, without high-bandwidth transaction bits.
    pub max_packet_size: u16,
    /// Service interval as a power-of-two exponent over 125 µs frames.
    pub interval: u8,
    pub max_burst: u8,
    pub max_streams: u8,
    pub mult: u8,
    pub bytes_per_interval: u16,
}

impl EndpointInfo {
    /// Total isochronous payload per service interval, counting the extra
    /// high-bandwidth transactions encoded in the raw descriptor.
    pub fn payload_for(desc: &EndpointDescriptor) -> u32 {
        u32::from(desc.base_packet_size()) * (1 + u32::from(desc.extra_transactions()))
    }
}

/// Normalizes the raw interval field for the given protocol generation,
/// link speed, and endpoint type. Out-of-range raw values are clamped with
/// a warning, never an error.
fn normalize_interval(raw: u8, usb_version: u16, speed: LinkSpeed, ty: EndpointType) -> u8 {
    if usb_version >= 0x0300 {
        if !ty.is_periodic() {
            return 0;
        }
        if raw == 0 {
            log::warn!("superspeed periodic endpoint with zero bInterval");
            return 0;
        }
        let exp = raw - 1;
        if exp > 15 {
            log::warn!("superspeed interval exponent {} out of range, clamping", exp);
            return 15;
        }
        return exp;
    }

    if usb_version >= 0x0200 && speed == LinkSpeed::High {
        if !ty.is_periodic() {
            return 0;
        }
        if raw == 0 {
            log::warn!("high-speed periodic endpoint with zero bInterval");
            return 0;
        }
        return (raw - 1).min(15);
    }

    match ty {
        // Full/low-speed interrupt (and all USB 1.1 periodic) intervals are
        // a linear 1..=255 millisecond count; fold to the nearest
        // power-of-two microframe exponent (1 ms == 2^3 frames).
        EndpointType::InterruptIn | EndpointType::InterruptOut => {
            let raw = if raw == 0 {
                log::warn!("interrupt endpoint with zero bInterval, assuming 1 ms");
                1
            } else {
                raw
            };
            let highest_bit = 7 - raw.leading_zeros() as u8;
            (highest_bit + 3).clamp(3, 10)
        }
        // Full-speed isoch intervals are already exponents over 1 ms frames.
        EndpointType::IsochIn | EndpointType::IsochOut => {
            if raw == 0 {
                log::warn!("isochronous endpoint with zero bInterval");
                return 3;
            }
            (raw - 1 + 3).min(15)
        }
        _ => 0,
    }
}

/// Builds an [`EndpointInfo`] from a raw endpoint descriptor and, when one
/// immediately follows it in the configuration blob, its SuperSpeed
/// companion.
pub fn translate(
    desc: &EndpointDescriptor,
    companion: Option<&SuperSpeedCompanionDescriptor>,
    usb_version: u16,
    speed: LinkSpeed,
) -> EndpointInfo {
    let ty = EndpointType::from_raw(desc.transfer_type_bits(), desc.is_in());
    let mut info = EndpointInfo {
        ep_num: desc.number(),
        direction: ty.direction(),
        ty,
        sync_ty: desc.sync_type(),
        usage_ty: desc.usage_type(),
        max_packet_size: desc.base_packet_size(),
        interval: normalize_interval(desc.interval, usb_version, speed, ty),
        max_burst: 0,
        max_streams: 0,
        mult: 0,
        bytes_per_interval: 0,
    };
    if let Some(cmp) = companion {
        info.max_burst = cmp.max_burst;
        if ty.is_bulk() {
            info.max_streams = cmp.bulk_max_streams();
        }
        if ty.is_isoch() {
            info.mult = cmp.isoch_mult();
        }
        if ty.is_periodic() {
            info.bytes_per_interval = cmp.bytes_per_interval;
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interrupt_in(raw_interval: u8) -> EndpointDescriptor {
        EndpointDescriptor {
            address: 0x81,
            attributes: 0x03,
            max_packet_size: 8,
            interval: raw_interval,
        }
    }

    #[test]
    fn eight_way_type_mapping() {
        assert_eq!(EndpointType::from_raw(0, true), EndpointType::Control);
        assert_eq!(EndpointType::from_raw(1, false), EndpointType::IsochOut);
        assert_eq!(EndpointType::from_raw(2, true), EndpointType::BulkIn);
        assert_eq!(
            EndpointType::from_raw(3, false),
            EndpointType::InterruptOut
        );
    }

    #[test]
    fn full_speed_interrupt_interval_bounds() {
        // Raw 1 and 255 ms both land inside [3, 10] without overflow.
        let lo = translate(&interrupt_in(1), None, 0x0200, LinkSpeed::Full);
        let hi = translate(&interrupt_in(255), None, 0x0200, LinkSpeed::Full);
        assert_eq!(lo.interval, 3);
        assert_eq!(hi.interval, 10);
        for raw in 1..=255u8 {
            let info = translate(&interrupt_in(raw), None, 0x0110, LinkSpeed::Low);
            assert!((3..=10).contains(&info.interval), "raw {}", raw);
        }
    }

    #[test]
    fn high_speed_interrupt_interval() {
        let info = translate(&interrupt_in(4), None, 0x0200, LinkSpeed::High);
        assert_eq!(info.interval, 3);
    }

    #[test]
    fn superspeed_interval_clamped() {
        let info = translate(&interrupt_in(40), None, 0x0300, LinkSpeed::Super);
        assert_eq!(info.interval, 15);
        let bulk = EndpointDescriptor {
            address: 0x02,
            attributes: 0x02,
            max_packet_size: 1024,
            interval: 9,
        };
        assert_eq!(
            translate(&bulk, None, 0x0300, LinkSpeed::Super).interval,
            0
        );
    }

    #[test]
    fn companion_merge_by_type() {
        let cmp = SuperSpeedCompanionDescriptor {
            max_burst: 3,
            attributes: 0x02,
            bytes_per_interval: 4096,
        };
        let iso = EndpointDescriptor {
            address: 0x83,
            attributes: 0x05,
            max_packet_size: 1024,
            interval: 1,
        };
        let info = translate(&iso, Some(&cmp), 0x0300, LinkSpeed::Super);
        assert_eq!(info.max_burst, 3);
        assert_eq!(info.mult, 2);
        assert_eq!(info.max_streams, 0);
        assert_eq!(info.bytes_per_interval, 4096);

        let bulk = EndpointDescriptor {
            address: 0x02,
            attributes: 0x02,
            max_packet_size: 1024,
            interval: 0,
        };
        let info = translate(&bulk, Some(&cmp), 0x0300, LinkSpeed::Super);
        assert_eq!(info.max_streams, 2);
        assert_eq!(info.mult, 0);
        assert_eq!(info.bytes_per_interval, 0);
    }

    #[test]
    fn high_bandwidth_payload() {
        let iso = EndpointDescriptor {
            address: 0x81,
            attributes: 0x05,
            // 1024 bytes base, 2 extra transactions
            max_packet_size: 0x1400,
            interval: 1,
        };
        assert_eq!(EndpointInfo::payload_for(&iso), 3072);
    }
}
