//! UVC video class driver.
//!
//! A video function spans a VideoControl interface and a VideoStreaming
//! interface grouped by an Interface Association Descriptor. Stream
//! parameters are negotiated with the probe/commit control, then payloads
//! arrive on an isochronous-in endpoint chosen from the streaming
//! interface's alternate settings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::class::{ClassDriver, DriverError, DriverProperties, Result};
use crate::endpoint::{translate, EndpointInfo, EpDirection, LinkSpeed};
use crate::enumerate::ConfigTree;
use crate::ring::XferRing;
use crate::transport::{CompletionCode, DeviceReqData, HostTransport, ReqRecipient, ReqTy};
use crate::usb::desc::decode_header;
use crate::usb::endpoint::{EndpointDescriptor, SuperSpeedCompanionDescriptor};
use crate::usb::interface::{InterfaceAssocDescriptor, InterfaceDescriptor};
use crate::usb::uvc::{
    PayloadHeader, ProbeCommit, VcHeader, GET_CUR, GET_DEF, PROBE_LEN_V10, PROBE_LEN_V11,
    PROBE_LEN_V15, SET_CUR, SUBCLASS_INTERFACE_COLLECTION, SUBCLASS_VIDEO_CONTROL,
    SUBCLASS_VIDEO_STREAMING, VC_HEADER, VS_COMMIT_CONTROL, VS_PROBE_CONTROL,
};
use crate::usb::{class_code, DescriptorKind, DESC_KIND_CS_INTERFACE};

const POLL_STEP_MS: u32 = 100;
/// Streaming pool depth: enough to ride out one missed service interval.
const STREAM_POOL: usize = 8;

/// One isochronous-in endpoint candidate from a streaming alternate setting.
#[derive(Clone, Copy, Debug)]
pub struct IsoEp {
    pub alt_setting: u8,
    pub ep_num: u8,
    /// Bytes per service interval: base packet size times the
    /// high-bandwidth transaction count.
    pub payload: u32,
    pub info: EndpointInfo,
}

pub struct Video {
    control_if: u8,
    streaming_if: u8,
    /// Probe/commit control length for the device's protocol version.
    probe_len: usize,
    iso_eps: Vec<IsoEp>,
    chosen: Option<IsoEp>,
    negotiated: Option<ProbeCommit>,
    last_frame_id: Option<bool>,
    frames: u64,
    isoch_glitches: u64,
}

impl Video {
    /// Walks the raw configuration blob for the video function: the IAD, the
    /// VideoControl header (protocol version) and every isochronous-in
    /// endpoint across the VideoStreaming alternate settings.
    pub fn bind(
        config: &ConfigTree,
        usb_version: u16,
        speed: LinkSpeed,
    ) -> Result<(Self, Vec<EndpointInfo>)> {
        let buf = config.raw.as_slice();

        let mut iad = None;
        let mut control_if = None;
        let mut streaming_if = None;
        let mut probe_len = PROBE_LEN_V11;
        let mut iso_eps: Vec<IsoEp> = Vec::new();

        let mut current: Option<InterfaceDescriptor> = None;
        let mut offset = 0usize;
        while offset + 2 <= buf.len() {
            let (kind, length) = decode_header(buf, offset, None)?;
            if length == 0 {
                return Err(DriverError::Desc(crate::usb::DescError::ZeroLength(offset)));
            }
            let record = &buf[offset..];

            if kind == DescriptorKind::InterfaceAssociation as u8 {
                let assoc = InterfaceAssocDescriptor::parse(record)?;
                if assoc.function_class == class_code::VIDEO
                    && assoc.function_sub_class == SUBCLASS_INTERFACE_COLLECTION
                {
                    iad = Some(assoc);
                }
            } else if kind == DescriptorKind::Interface as u8 {
                let desc = InterfaceDescriptor::parse(record)?;
                if desc.class == class_code::VIDEO {
                    match desc.sub_class {
                        SUBCLASS_VIDEO_CONTROL => control_if = Some(desc.number),
                        SUBCLASS_VIDEO_STREAMING => streaming_if = Some(desc.number),
                        _ => {}
                    }
                }
                current = Some(desc);
            } else if kind == DESC_KIND_CS_INTERFACE {
                let is_control = current
                    .map(|i| i.class == class_code::VIDEO && i.sub_class == SUBCLASS_VIDEO_CONTROL)
                    .unwrap_or(false);
                let subtype = record.get(2).copied().unwrap_or(0);
                if is_control && subtype == VC_HEADER {
                    let header = VcHeader::parse(record)?;
                    probe_len = if header.is_obsolete_1_0() {
                        PROBE_LEN_V10
                    } else {
                        PROBE_LEN_V11
                    };
                    debug!(
                        "video function speaks UVC {:#06x}, {} byte probe control",
                        header.bcd_uvc, probe_len
                    );
                }
            } else if kind == DescriptorKind::Endpoint as u8 {
                let in_streaming = current
                    .map(|i| {
                        i.class == class_code::VIDEO && i.sub_class == SUBCLASS_VIDEO_STREAMING
                    })
                    .unwrap_or(false);
                if in_streaming {
                    let desc = EndpointDescriptor::parse(record)?;
                    let ty = desc.transfer_type_bits();
                    if ty == 1 && desc.is_in() {
                        let companion = Self::companion_after(buf, offset + usize::from(length));
                        let info =
                            translate(&desc, companion.as_ref(), usb_version, speed);
                        iso_eps.push(IsoEp {
                            alt_setting: current.map(|i| i.alternate_setting).unwrap_or(0),
                            ep_num: desc.number(),
                            payload: EndpointInfo::payload_for(&desc),
                            info,
                        });
                    }
                }
            }

            offset += usize::from(length);
        }

        if let Some(assoc) = iad {
            debug!(
                "video IAD groups interfaces {}..{}",
                assoc.first_interface,
                assoc.first_interface + assoc.interface_count
            );
        }
        let control_if =
            control_if.ok_or(DriverError::Protocol("no VideoControl interface"))?;
        let streaming_if =
            streaming_if.ok_or(DriverError::Protocol("no VideoStreaming interface"))?;
        if iso_eps.is_empty() {
            return Err(DriverError::Protocol("no isochronous-in streaming endpoint"));
        }

        // Configure the widest candidate so the endpoint context covers
        // every alternate setting the negotiation may land on.
        let widest = iso_eps
            .iter()
            .max_by_key(|e| e.payload)
            .map(|e| e.info)
            .into_iter()
            .collect();

        Ok((
            Self {
                control_if,
                streaming_if,
                probe_len,
                iso_eps,
                chosen: None,
                negotiated: None,
                last_frame_id: None,
                frames: 0,
                isoch_glitches: 0,
            },
            widest,
        ))
    }

    fn companion_after(buf: &[u8], offset: usize) -> Option<SuperSpeedCompanionDescriptor> {
        let (kind, _) = decode_header(buf, offset, None).ok()?;
        if kind == DescriptorKind::SuperSpeedCompanion as u8 {
            SuperSpeedCompanionDescriptor::parse(&buf[offset..]).ok()
        } else {
            None
        }
    }

    fn vs_request(
        &self,
        xfer: &mut dyn HostTransport,
        request: u8,
        selector: u8,
        data: DeviceReqData<'_>,
    ) -> Result<()> {
        xfer.device_request(
            ReqTy::Class,
            ReqRecipient::Interface,
            request,
            u16::from(selector) << 8,
            u16::from(self.streaming_if),
            data,
        )?;
        Ok(())
    }

    /// Reads the probe control, tolerating devices that reply with fewer
    /// bytes than their protocol version promises.
    fn read_probe(&self, xfer: &mut dyn HostTransport, request: u8) -> Result<ProbeCommit> {
        // Sized for the 1.5 layout; only the 1.1 prefix is interpreted.
        let mut buf = [0u8; PROBE_LEN_V15];
        self.vs_request(
            xfer,
            request,
            VS_PROBE_CONTROL,
            DeviceReqData::In(&mut buf[..self.probe_len]),
        )?;
        Ok(ProbeCommit::parse(&buf[..self.probe_len])?)
    }

    /// Negotiates stream parameters and binds the matching alternate
    /// setting.
    pub fn probe_and_commit(
        &mut self,
        xfer: &mut dyn HostTransport,
        format_index: u8,
        frame_index: u8,
    ) -> Result<()> {
        // Start from the device's defaults; older firmware rejects GET_DEF,
        // in which case the current values serve the same purpose.
        let mut request = match self.read_probe(xfer, GET_DEF) {
            Ok(pc) => pc,
            Err(e) => {
                debug!("GET_DEF rejected ({}), falling back to GET_CUR", e);
                self.read_probe(xfer, GET_CUR)?
            }
        };
        request.hint = 1; // keep dwFrameInterval fixed
        request.format_index = format_index;
        request.frame_index = frame_index;

        self.vs_request(
            xfer,
            SET_CUR,
            VS_PROBE_CONTROL,
            DeviceReqData::Out(&request.to_bytes(self.probe_len)),
        )?;
        let negotiated = self.read_probe(xfer, GET_CUR)?;
        info!(
            "video negotiation: {} byte payloads, {} byte frames",
            negotiated.max_payload_transfer_size, negotiated.max_video_frame_size
        );

        // Smallest alternate setting that still covers the negotiated
        // payload; devices with only undersized endpoints stream anyway at
        // the reduced rate.
        let chosen = self
            .iso_eps
            .iter()
            .filter(|e| e.payload >= negotiated.max_payload_transfer_size)
            .min_by_key(|e| e.payload)
            .copied()
            .unwrap_or_else(|| {
                warn!("no alternate setting covers the negotiated payload size");
                self.iso_eps[0]
            });

        let mut commit = negotiated;
        if commit.max_payload_transfer_size > chosen.payload {
            commit.max_payload_transfer_size = chosen.payload;
        }
        self.vs_request(
            xfer,
            SET_CUR,
            VS_COMMIT_CONTROL,
            DeviceReqData::Out(&commit.to_bytes(self.probe_len)),
        )?;
        xfer.set_interface(self.streaming_if, chosen.alt_setting)?;
        debug!(
            "video bound to alt setting {} (endpoint {}, {} byte payload)",
            chosen.alt_setting, chosen.ep_num, chosen.payload
        );

        self.chosen = Some(chosen);
        self.negotiated = Some(commit);
        Ok(())
    }

    pub fn frames_received(&self) -> u64 {
        self.frames
    }

    fn ready(&self) -> Result<(IsoEp, ProbeCommit)> {
        match (self.chosen, self.negotiated) {
            (Some(ep), Some(pc)) => Ok((ep, pc)),
            _ => Err(DriverError::NotInitialized),
        }
    }

    /// Decodes one payload, updating the frame counter on a Frame-ID
    /// toggle. Returns the image bytes after the header.
    fn handle_payload<'a>(&mut self, packet: &'a [u8]) -> Option<&'a [u8]> {
        let header = match PayloadHeader::parse(packet) {
            Some(h) => h,
            None => {
                trace!("runt isochronous packet ({} bytes)", packet.len());
                return None;
            }
        };
        if header.error() {
            warn!("payload header signals a stream error");
        }
        let fid = header.frame_id();
        if self.last_frame_id != Some(fid) {
            if self.last_frame_id.is_some() {
                self.frames += 1;
            }
            self.last_frame_id = Some(fid);
        }
        if header.end_of_frame() {
            trace!("end-of-frame payload");
        }
        packet.get(usize::from(header.length)..)
    }

    /// Free-running capture loop: keeps the pool's transfers outstanding
    /// and counts frames until the stop flag, time budget or transfer
    /// budget ends it. Returns the frames received during the run.
    pub fn stream(
        &mut self,
        xfer: &mut dyn HostTransport,
        stop: &AtomicBool,
        budget: Option<Duration>,
        max_transfers: Option<u64>,
    ) -> Result<u64> {
        let (ep, _) = self.ready()?;
        let payload = ep.payload as usize;
        let mut ring = XferRing::new(STREAM_POOL, payload);
        let started = Instant::now();
        let frames_before = self.frames;

        let result = 'run: loop {
            if stop.load(Ordering::Relaxed) {
                break Ok(());
            }
            if let Some(budget) = budget {
                if started.elapsed() >= budget {
                    break Ok(());
                }
            }

            while !ring.is_full() && max_transfers.map_or(true, |max| ring.submitted() < max) {
                let buf = match ring.take_for_submit() {
                    Ok(buf) => buf,
                    Err(e) => break 'run Err(e.into()),
                };
                if let Err(e) = xfer.submit_in(ep.ep_num, buf) {
                    break 'run Err(e.into());
                }
            }
            // Transfer budget spent and every completion harvested.
            if ring.is_empty() {
                break Ok(());
            }

            let transfer = match xfer.wait(ep.ep_num, EpDirection::In, POLL_STEP_MS) {
                Ok(None) => continue,
                Ok(Some(t)) => t,
                Err(e) => break Err(e.into()),
            };
            let bytes = transfer.bytes as usize;
            match transfer.code {
                code if code.has_data() => {
                    self.handle_payload(&transfer.buffer[..bytes.min(payload)]);
                }
                CompletionCode::Babble | CompletionCode::MissedService => {
                    // Isochronous scheduling hiccups; the stream recovers on
                    // the next service interval.
                    self.isoch_glitches += 1;
                }
                code => {
                    ring.complete(transfer.buffer)?;
                    break Err(DriverError::Hardware(code));
                }
            }
            ring.complete(transfer.buffer)?;
        };

        self.drain(xfer, ep.ep_num, &mut ring)?;
        result.map(|_| self.frames - frames_before)
    }

    /// Captures a single frame: the pool is sized to the negotiated frame,
    /// every transfer submitted up front and harvested in submission order,
    /// payload headers stripped and the image reassembled. MJPEG devices
    /// omit the standard Huffman tables, so a DHT segment is reinserted
    /// before the first Start-of-Scan marker.
    pub fn save_frame(&mut self, xfer: &mut dyn HostTransport) -> Result<Vec<u8>> {
        let (ep, negotiated) = self.ready()?;
        let payload = ep.payload as usize;
        if payload == 0 {
            return Err(DriverError::Protocol("zero payload size"));
        }
        let transfers = (negotiated.max_video_frame_size as usize + payload - 1) / payload;
        let transfers = transfers.max(1);

        let mut ring = XferRing::new(transfers, payload);
        for _ in 0..transfers {
            let buf = ring.take_for_submit()?;
            xfer.submit_in(ep.ep_num, buf)?;
        }

        let mut frame = Vec::with_capacity(negotiated.max_video_frame_size as usize);
        let mut done = false;
        while !ring.is_empty() && !done {
            let transfer = match xfer.wait(ep.ep_num, EpDirection::In, POLL_STEP_MS)? {
                Some(t) => t,
                None => continue,
            };
            let bytes = transfer.bytes as usize;
            match transfer.code {
                code if code.has_data() => {
                    let packet = &transfer.buffer[..bytes.min(payload)];
                    let eof = PayloadHeader::parse(packet)
                        .map(|h| h.end_of_frame())
                        .unwrap_or(false);
                    if let Some(image) = self.handle_payload(packet) {
                        frame.extend_from_slice(image);
                    }
                    done = eof;
                }
                CompletionCode::Babble | CompletionCode::MissedService => {
                    self.isoch_glitches += 1;
                }
                code => {
                    ring.complete(transfer.buffer)?;
                    self.drain(xfer, ep.ep_num, &mut ring)?;
                    return Err(DriverError::Hardware(code));
                }
            }
            ring.complete(transfer.buffer)?;
        }
        self.drain(xfer, ep.ep_num, &mut ring)?;

        reinsert_dht(&mut frame);
        Ok(frame)
    }

    /// Cancels whatever is still outstanding and verifies the ring really
    /// emptied; a stuck transfer here means the endpoint is wedged.
    fn drain(
        &mut self,
        xfer: &mut dyn HostTransport,
        ep_num: u8,
        ring: &mut XferRing,
    ) -> Result<()> {
        if ring.is_empty() {
            return Ok(());
        }
        let len = self
            .chosen
            .map(|e| e.payload as usize)
            .unwrap_or(0);
        let reclaimed = xfer.cancel(ep_num, EpDirection::In)?;
        for _ in 0..reclaimed.min(ring.in_flight()) {
            ring.complete(vec![0u8; len])?;
        }
        if !ring.is_empty() {
            return Err(DriverError::Protocol("transfers still in flight after drain"));
        }
        debug!("video drain reclaimed {} transfers", reclaimed);
        Ok(())
    }
}

impl ClassDriver for Video {
    fn init(&mut self, xfer: &mut dyn HostTransport) -> Result<()> {
        // First format and frame index; embedders pick others through
        // `probe_and_commit` directly.
        self.probe_and_commit(xfer, 1, 1)
    }

    fn print_info(&self) {
        match self.negotiated {
            Some(pc) => info!(
                "video function: control if {}, streaming if {}, {} byte frames",
                self.control_if, self.streaming_if, pc.max_video_frame_size
            ),
            None => info!(
                "video function: control if {}, streaming if {} (not negotiated)",
                self.control_if, self.streaming_if
            ),
        }
    }

    fn properties(&self) -> DriverProperties {
        DriverProperties {
            name: "video",
            interface_class: class_code::VIDEO,
            max_frame_size: self.negotiated.map(|pc| pc.max_video_frame_size),
            ..Default::default()
        }
    }
}

// Standard JPEG Huffman tables (ITU T.81 annex K.3).
const DC_LUM_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const DC_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const DC_CHROM_BITS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const AC_LUM_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7D];
const AC_LUM_VALS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61,
    0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08, 0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52,
    0xD1, 0xF0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x25,
    0x26, 0x27, 0x28, 0x29, 0x2A, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45,
    0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64,
    0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x83,
    0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99,
    0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6,
    0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3,
    0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8,
    0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
];
const AC_CHROM_BITS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
const AC_CHROM_VALS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61,
    0x71, 0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xA1, 0xB1, 0xC1, 0x09, 0x23, 0x33,
    0x52, 0xF0, 0x15, 0x62, 0x72, 0xD1, 0x0A, 0x16, 0x24, 0x34, 0xE1, 0x25, 0xF1, 0x17, 0x18,
    0x19, 0x1A, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44,
    0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63,
    0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A,
    0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97,
    0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4,
    0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA,
    0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7,
    0xE8, 0xE9, 0xEA, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
];

fn standard_dht() -> Vec<u8> {
    let tables: [(u8, &[u8], &[u8]); 4] = [
        (0x00, &DC_LUM_BITS, &DC_VALS),
        (0x10, &AC_LUM_BITS, &AC_LUM_VALS),
        (0x01, &DC_CHROM_BITS, &DC_VALS),
        (0x11, &AC_CHROM_BITS, &AC_CHROM_VALS),
    ];
    let mut seg = vec![0xFF, 0xC4, 0, 0];
    for (class_id, bits, vals) in tables {
        seg.push(class_id);
        seg.extend_from_slice(bits);
        seg.extend_from_slice(vals);
    }
    let len = (seg.len() - 2) as u16;
    seg[2..4].copy_from_slice(&len.to_be_bytes());
    seg
}

/// Inserts the standard Huffman tables before the first Start-of-Scan
/// marker unless the frame already carries a DHT segment.
fn reinsert_dht(frame: &mut Vec<u8>) {
    let mut i = 0;
    while i + 1 < frame.len() {
        if frame[i] == 0xFF {
            match frame[i + 1] {
                0xC4 => return,
                0xDA => {
                    let seg = standard_dht();
                    frame.splice(i..i, seg);
                    return;
                }
                _ => {}
            }
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dht_segment_is_well_formed() {
        let seg = standard_dht();
        assert_eq!(&seg[..2], &[0xFF, 0xC4]);
        let len = u16::from_be_bytes([seg[2], seg[3]]) as usize;
        assert_eq!(len + 2, seg.len());
        assert_eq!(len, 0x01A2);
    }

    #[test]
    fn dht_inserted_before_sos() {
        // SOI, APP0 stub, SOS, entropy data.
        let mut frame = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0xFF, 0xDA, 0x12, 0x34];
        reinsert_dht(&mut frame);
        let dht_at = frame
            .windows(2)
            .position(|w| w == [0xFF, 0xC4])
            .expect("DHT inserted");
        let sos_at = frame
            .windows(2)
            .position(|w| w == [0xFF, 0xDA])
            .expect("SOS kept");
        assert!(dht_at < sos_at);
    }

    #[test]
    fn dht_not_duplicated() {
        let mut frame = vec![0xFF, 0xD8, 0xFF, 0xC4, 0x00, 0x02, 0xFF, 0xDA];
        let before = frame.clone();
        reinsert_dht(&mut frame);
        assert_eq!(frame, before);
    }
}
