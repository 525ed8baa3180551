//! End-to-end driver tests over a scripted transport.
//!
//! The mock answers control requests from canned descriptors and feeds
//! bulk/interrupt completions from per-test scripts, so every protocol
//! exchange (CBW/CSW framing, stall recovery, probe/commit, port resets)
//! runs exactly as it would against a controller.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use usbclass::usb::uvc::ProbeCommit;
use usbclass::{
    enumerate, ClassDriver, CompletionCode, DeviceReqData, Driver, EndpointInfo, EpDirection,
    HostTransport, LinkSpeed, ReqRecipient, ReqTy, Transfer, TransportError,
};

enum InReply {
    Data(Vec<u8>),
    Csw(u8),
    BadCsw,
    Code(CompletionCode),
}

struct MockTransport {
    speed: LinkSpeed,
    device_desc: Vec<u8>,
    config: Vec<u8>,
    hub_desc: Vec<u8>,
    port_status: VecDeque<[u8; 4]>,
    probe_replies: VecDeque<Vec<u8>>,
    in_replies: VecDeque<InReply>,
    out_codes: VecDeque<CompletionCode>,
    pending_in: VecDeque<(u8, Vec<u8>)>,
    pending_out: VecDeque<(u8, Vec<u8>)>,
    last_tag: u32,
    cbw_count: usize,
    msc_resets: usize,
    cleared_halts: Vec<u16>,
    port_status_reads: Vec<u16>,
    port_features_cleared: Vec<(u16, u16)>,
    configured: Vec<(usize, Option<u8>)>,
    evaluated: usize,
    set_configs: Vec<u8>,
    set_interfaces: Vec<(u16, u16)>,
    set_cur: Vec<(u8, Vec<u8>)>,
    port_features_set: Vec<(u16, u16)>,
}

impl MockTransport {
    fn new(device_desc: Vec<u8>, config: Vec<u8>, speed: LinkSpeed) -> Self {
        Self {
            speed,
            device_desc,
            config,
            hub_desc: Vec::new(),
            port_status: VecDeque::new(),
            probe_replies: VecDeque::new(),
            in_replies: VecDeque::new(),
            out_codes: VecDeque::new(),
            pending_in: VecDeque::new(),
            pending_out: VecDeque::new(),
            last_tag: 0,
            cbw_count: 0,
            msc_resets: 0,
            cleared_halts: Vec::new(),
            port_status_reads: Vec::new(),
            port_features_cleared: Vec::new(),
            configured: Vec::new(),
            evaluated: 0,
            set_configs: Vec::new(),
            set_interfaces: Vec::new(),
            set_cur: Vec::new(),
            port_features_set: Vec::new(),
        }
    }

    fn fill(buf: &mut [u8], src: &[u8]) {
        let n = buf.len().min(src.len());
        buf[..n].copy_from_slice(&src[..n]);
    }
}

impl HostTransport for MockTransport {
    fn device_request(
        &mut self,
        ty: ReqTy,
        recipient: ReqRecipient,
        request: u8,
        value: u16,
        index: u16,
        data: DeviceReqData<'_>,
    ) -> Result<(), TransportError> {
        match (ty, recipient, request) {
            (ReqTy::Standard, ReqRecipient::Device, 0x06) => {
                let kind = (value >> 8) as u8;
                if let DeviceReqData::In(buf) = data {
                    match kind {
                        1 => Self::fill(buf, &self.device_desc),
                        2 => Self::fill(buf, &self.config),
                        _ => return Err(TransportError::Rejected("descriptor not scripted")),
                    }
                }
                Ok(())
            }
            (ReqTy::Standard, ReqRecipient::Device, 0x09) => {
                self.set_configs.push(value as u8);
                Ok(())
            }
            (ReqTy::Standard, ReqRecipient::Interface, 0x0B) => {
                self.set_interfaces.push((index, value));
                Ok(())
            }
            (ReqTy::Standard, ReqRecipient::Endpoint, 0x01) => {
                self.cleared_halts.push(index);
                Ok(())
            }
            (ReqTy::Class, ReqRecipient::Device, 0x06) => {
                if let DeviceReqData::In(buf) = data {
                    Self::fill(buf, &self.hub_desc);
                }
                Ok(())
            }
            (ReqTy::Class, ReqRecipient::Interface, 0xFE) => {
                if let DeviceReqData::In(buf) = data {
                    buf[0] = 0;
                }
                Ok(())
            }
            (ReqTy::Class, ReqRecipient::Interface, 0xFF) => {
                self.msc_resets += 1;
                Ok(())
            }
            (ReqTy::Class, ReqRecipient::Other, 0x00) => {
                self.port_status_reads.push(index);
                let status = self
                    .port_status
                    .pop_front()
                    .ok_or(TransportError::Rejected("port status not scripted"))?;
                if let DeviceReqData::In(buf) = data {
                    Self::fill(buf, &status);
                }
                Ok(())
            }
            (ReqTy::Class, ReqRecipient::Other, 0x03) => {
                self.port_features_set.push((value, index));
                Ok(())
            }
            (ReqTy::Class, ReqRecipient::Other, 0x01) => {
                self.port_features_cleared.push((value, index));
                Ok(())
            }
            // UVC probe/commit controls on the streaming interface.
            (ReqTy::Class, ReqRecipient::Interface, 0x01) => {
                if let DeviceReqData::Out(bytes) = data {
                    self.set_cur.push(((value >> 8) as u8, bytes.to_vec()));
                }
                Ok(())
            }
            (ReqTy::Class, ReqRecipient::Interface, 0x81 | 0x87) => {
                let reply = self
                    .probe_replies
                    .pop_front()
                    .ok_or(TransportError::Rejected("probe reply not scripted"))?;
                if let DeviceReqData::In(buf) = data {
                    Self::fill(buf, &reply);
                }
                Ok(())
            }
            _ => Err(TransportError::Rejected("request not scripted")),
        }
    }

    fn configure_endpoints(
        &mut self,
        endpoints: &[EndpointInfo],
        hub_ports: Option<u8>,
    ) -> Result<(), TransportError> {
        self.configured.push((endpoints.len(), hub_ports));
        Ok(())
    }

    fn evaluate_context(&mut self, _max_exit_latency: u16) -> Result<(), TransportError> {
        self.evaluated += 1;
        Ok(())
    }

    fn submit_in(&mut self, ep_num: u8, buffer: Vec<u8>) -> Result<(), TransportError> {
        self.pending_in.push_back((ep_num, buffer));
        Ok(())
    }

    fn submit_out(&mut self, ep_num: u8, buffer: Vec<u8>) -> Result<(), TransportError> {
        // Track CBW tags so scripted CSWs can echo them.
        if buffer.len() == 31 && buffer[0..4] == [0x55, 0x53, 0x42, 0x43] {
            self.last_tag = u32::from_le_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]);
            self.cbw_count += 1;
        }
        self.pending_out.push_back((ep_num, buffer));
        Ok(())
    }

    fn wait(
        &mut self,
        ep_num: u8,
        direction: EpDirection,
        _timeout_ms: u32,
    ) -> Result<Option<Transfer>, TransportError> {
        let pending = match direction {
            EpDirection::In => &mut self.pending_in,
            _ => &mut self.pending_out,
        };
        let pos = match pending.iter().position(|(ep, _)| *ep == ep_num) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        if direction == EpDirection::In {
            if self.in_replies.is_empty() {
                return Ok(None);
            }
            let (_, mut buffer) = self.pending_in.remove(pos).unwrap();
            let reply = self.in_replies.pop_front().unwrap();
            let (code, bytes) = match reply {
                InReply::Data(data) => {
                    Self::fill(&mut buffer, &data);
                    let code = if data.len() < buffer.len() {
                        CompletionCode::ShortPacket
                    } else {
                        CompletionCode::Success
                    };
                    (code, data.len() as u32)
                }
                InReply::Csw(status) => {
                    let mut csw = vec![0x55, 0x53, 0x42, 0x53];
                    csw.extend_from_slice(&self.last_tag.to_le_bytes());
                    csw.extend_from_slice(&0u32.to_le_bytes());
                    csw.push(status);
                    Self::fill(&mut buffer, &csw);
                    (CompletionCode::Success, 13)
                }
                InReply::BadCsw => {
                    let mut csw = vec![0xDE, 0xAD, 0xBE, 0xEF];
                    csw.extend_from_slice(&self.last_tag.to_le_bytes());
                    csw.extend_from_slice(&0u32.to_le_bytes());
                    csw.push(0);
                    Self::fill(&mut buffer, &csw);
                    (CompletionCode::Success, 13)
                }
                InReply::Code(code) => (code, 0),
            };
            Ok(Some(Transfer {
                code,
                bytes,
                buffer,
            }))
        } else {
            let (_, buffer) = self.pending_out.remove(pos).unwrap();
            let code = self.out_codes.pop_front().unwrap_or(CompletionCode::Success);
            let bytes = if code == CompletionCode::Success {
                buffer.len() as u32
            } else {
                0
            };
            Ok(Some(Transfer {
                code,
                bytes,
                buffer,
            }))
        }
    }

    fn cancel(&mut self, ep_num: u8, direction: EpDirection) -> Result<usize, TransportError> {
        let pending = match direction {
            EpDirection::In => &mut self.pending_in,
            _ => &mut self.pending_out,
        };
        let before = pending.len();
        pending.retain(|(ep, _)| *ep != ep_num);
        Ok(before - pending.len())
    }

    fn route_string(&self) -> u32 {
        0
    }

    fn link_speed(&self) -> LinkSpeed {
        self.speed
    }
}

fn device_descriptor(class: u8) -> Vec<u8> {
    vec![
        18, 1, 0x00, 0x02, class, 0, 0, 64, 0x34, 0x12, 0x78, 0x56, 0x00, 0x01, 0, 0, 0, 1,
    ]
}

fn msc_config() -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(&[9, 2, 0, 0, 1, 1, 0, 0x80, 50]);
    raw.extend_from_slice(&[9, 4, 0, 0, 2, 0x08, 0x06, 0x50, 0]);
    raw.extend_from_slice(&[7, 5, 0x81, 2, 0x00, 0x02, 0]);
    raw.extend_from_slice(&[7, 5, 0x02, 2, 0x00, 0x02, 0]);
    let total = raw.len() as u16;
    raw[2..4].copy_from_slice(&total.to_le_bytes());
    raw
}

fn inquiry_data() -> Vec<u8> {
    let mut data = vec![0u8; 36];
    data[8..16].copy_from_slice(b"MOCKVEND");
    data[16..26].copy_from_slice(b"MOCK STICK");
    data
}

/// ReadCapacity(10) parameter data: max LBA 0xFFFF, 512 byte blocks,
/// big-endian on the wire.
fn capacity_data() -> Vec<u8> {
    vec![0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x02, 0x00]
}

#[test]
fn msc_enumeration_end_to_end() {
    let mut mock = MockTransport::new(device_descriptor(0), msc_config(), LinkSpeed::High);
    mock.in_replies = VecDeque::from([
        InReply::Data(inquiry_data()),
        InReply::Csw(0),
        InReply::Csw(0),
        InReply::Data(capacity_data()),
        InReply::Csw(0),
    ]);

    let (info, driver) = enumerate(&mut mock).expect("enumeration succeeds");
    assert_eq!(info.desc.vendor, 0x1234);
    assert_eq!(info.config.interfaces.len(), 1);

    let driver = driver.expect("mass-storage driver constructed");
    assert!(matches!(driver, Driver::MassStorage(_)));
    let props = driver.properties();
    assert_eq!(props.block_size, Some(512));
    assert_eq!(props.max_lba, Some(0xFFFF));

    assert_eq!(mock.evaluated, 1);
    assert_eq!(mock.configured, vec![(2, None)]);
    assert_eq!(mock.set_configs, vec![1]);
    assert_eq!(mock.msc_resets, 0);
}

#[test]
fn cbw_stall_recovers_once_then_succeeds() {
    let mut mock = MockTransport::new(device_descriptor(0), msc_config(), LinkSpeed::High);
    // First CBW stalls; after reset recovery the whole first init sequence
    // runs clean.
    mock.out_codes = VecDeque::from([CompletionCode::Stall]);
    mock.in_replies = VecDeque::from([
        InReply::Data(inquiry_data()),
        InReply::Csw(0),
        InReply::Csw(0),
        InReply::Data(capacity_data()),
        InReply::Csw(0),
    ]);

    let (_, driver) = enumerate(&mut mock).expect("enumeration succeeds");
    assert!(driver.is_some());
    assert_eq!(mock.msc_resets, 1);
    // Reset recovery clears both bulk halts (IN address carries bit 7).
    assert!(mock.cleared_halts.contains(&0x81));
    assert!(mock.cleared_halts.contains(&0x02));
}

#[test]
fn double_cbw_stall_is_fatal_after_one_recovery() {
    let mut mock = MockTransport::new(device_descriptor(0), msc_config(), LinkSpeed::High);
    // Every CBW stalls. Each of the three init sequences gets one reset
    // recovery and one retry before giving up, so exactly six CBWs and
    // three resets cross the wire.
    mock.out_codes = VecDeque::from(vec![CompletionCode::Stall; 6]);

    let err = enumerate(&mut mock).expect_err("init cannot complete");
    assert!(err.to_string().contains("stall"));
    assert_eq!(mock.cbw_count, 6);
    assert_eq!(mock.msc_resets, 3);
    assert!(mock.out_codes.is_empty());
}

#[test]
fn csw_signature_mismatch_triggers_reset_recovery() {
    let mut mock = MockTransport::new(device_descriptor(0), msc_config(), LinkSpeed::High);
    // Every CSW comes back with a garbage signature, so all three init
    // sequences fail and each failure runs a reset recovery.
    mock.in_replies = VecDeque::from([
        InReply::Data(inquiry_data()),
        InReply::BadCsw,
        InReply::Data(inquiry_data()),
        InReply::BadCsw,
        InReply::BadCsw,
    ]);

    let err = enumerate(&mut mock).expect_err("init cannot complete");
    assert!(err.to_string().contains("CSW"));
    assert!(mock.msc_resets >= 1);
}

#[test]
fn unknown_class_yields_no_driver_and_no_configuration() {
    let mut config = msc_config();
    config[9 + 5] = 0xFF; // interface class: vendor-specific
    let mut mock = MockTransport::new(device_descriptor(0), config, LinkSpeed::High);

    let (info, driver) = enumerate(&mut mock).expect("enumeration still succeeds");
    assert!(driver.is_none());
    assert_eq!(info.config.interfaces[0].desc.class, 0xFF);
    assert_eq!(mock.evaluated, 0);
    assert!(mock.configured.is_empty());
    assert!(mock.set_configs.is_empty());
}

fn hub_config() -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(&[9, 2, 0, 0, 1, 1, 0, 0xE0, 0]);
    raw.extend_from_slice(&[9, 4, 0, 0, 1, 0x09, 0, 0, 0]);
    // Status-change interrupt endpoint.
    raw.extend_from_slice(&[7, 5, 0x81, 3, 0x01, 0x00, 12]);
    let total = raw.len() as u16;
    raw[2..4].copy_from_slice(&total.to_le_bytes());
    raw
}

#[test]
fn hub_port_reset_infers_speed_only_when_enabled() {
    let mut mock = MockTransport::new(device_descriptor(9), hub_config(), LinkSpeed::High);
    // 4-port USB 2.0 hub, 2 ms power-on-good.
    mock.hub_desc = vec![9, 0x29, 4, 0x00, 0x00, 1, 0, 0x00, 0xFF];

    let (_, driver) = enumerate(&mut mock).expect("hub enumerates");
    let mut hub = match driver {
        Some(Driver::Hub(hub)) => hub,
        other => panic!("expected hub driver, got {:?}", other.map(|d| d.kind())),
    };
    assert_eq!(mock.configured, vec![(1, Some(4))]);

    // Connected but never enabled after reset: an error, not a speed guess.
    mock.port_status = VecDeque::from([
        [0x01, 0x01, 0x00, 0x00], // powered, connected
        [0x01, 0x01, 0x10, 0x00], // reset done (change bit), still not enabled
    ]);
    let err = hub.reset_port(&mut mock, 1).expect_err("port never enabled");
    assert!(err.to_string().contains("not enabled"));

    // Enabled high-speed device.
    mock.port_status = VecDeque::from([
        [0x03, 0x01, 0x00, 0x00], // powered, connected, pre-reset
        [0x03, 0x05, 0x10, 0x00], // enabled + high-speed, reset change set
    ]);
    let speed = hub.reset_port(&mut mock, 1).expect("reset completes");
    assert_eq!(speed, LinkSpeed::High);
    // PORT_RESET was actually issued against port 1.
    assert!(mock
        .port_features_set
        .iter()
        .any(|&(feature, index)| feature == 4 && index & 0xFF == 1));
}

#[test]
fn hub_status_poll_reads_exactly_the_flagged_ports() {
    let mut mock = MockTransport::new(device_descriptor(9), hub_config(), LinkSpeed::High);
    mock.hub_desc = vec![9, 0x29, 4, 0x00, 0x00, 1, 0, 0x00, 0xFF];

    let (_, driver) = enumerate(&mut mock).expect("hub enumerates");
    let mut hub = match driver {
        Some(Driver::Hub(hub)) => hub,
        other => panic!("expected hub driver, got {:?}", other),
    };

    // The change bitmap flags ports 1 and 3; bit 0 is the hub itself.
    mock.in_replies = VecDeque::from([InReply::Data(vec![0b0000_1010])]);
    // Both flagged ports report a connection change.
    mock.port_status = VecDeque::from([
        [0x01, 0x01, 0x01, 0x00], // connected, powered, C_CONNECTION
        [0x00, 0x01, 0x01, 0x00], // disconnected, powered, C_CONNECTION
    ]);

    let stop = AtomicBool::new(false);
    hub.read_hub(&mut mock, &stop, Some(Duration::from_millis(20)))
        .expect("poll exits on its time budget");

    // Only the flagged ports were queried, in order, and only their
    // connection-change bits were cleared (C_PORT_CONNECTION is 16).
    assert_eq!(mock.port_status_reads, vec![1, 3]);
    assert_eq!(mock.port_features_cleared, vec![(16, 1), (16, 3)]);
    // The outstanding status-change transfer was cancelled on exit.
    assert!(mock.pending_in.is_empty());
}

fn uvc_config() -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(&[9, 2, 0, 0, 2, 1, 0, 0x80, 250]);
    // IAD grouping the video function.
    raw.extend_from_slice(&[8, 11, 0, 2, 0x0E, 0x03, 0, 0]);
    // VideoControl interface + class-specific header (UVC 1.1).
    raw.extend_from_slice(&[9, 4, 0, 0, 0, 0x0E, 0x01, 0, 0]);
    raw.extend_from_slice(&[13, 0x24, 0x01, 0x10, 0x01, 13, 0, 0x80, 0x8D, 0x5B, 0x00, 1, 1]);
    // VideoStreaming alt 0 (idle, no endpoint).
    raw.extend_from_slice(&[9, 4, 1, 0, 0, 0x0E, 0x02, 0, 0]);
    // Alt 1: isochronous-in, 1024 byte packets.
    raw.extend_from_slice(&[9, 4, 1, 1, 1, 0x0E, 0x02, 0, 0]);
    raw.extend_from_slice(&[7, 5, 0x81, 0x05, 0x00, 0x04, 1]);
    // Alt 2: isochronous-in, 1024 byte packets with two extra transactions.
    raw.extend_from_slice(&[9, 4, 1, 2, 1, 0x0E, 0x02, 0, 0]);
    raw.extend_from_slice(&[7, 5, 0x81, 0x05, 0x00, 0x14, 1]);
    let total = raw.len() as u16;
    raw[2..4].copy_from_slice(&total.to_le_bytes());
    raw
}

#[test]
fn uvc_probe_commit_picks_smallest_covering_alt_setting() {
    let mut mock = MockTransport::new(device_descriptor(0xEF), uvc_config(), LinkSpeed::High);

    let defaults = ProbeCommit {
        format_index: 1,
        frame_index: 1,
        frame_interval: 333333,
        max_video_frame_size: 100_000,
        max_payload_transfer_size: 2000,
        ..ProbeCommit::default()
    };
    // GET_DEF, then GET_CUR after the probe SET_CUR.
    mock.probe_replies = VecDeque::from([defaults.to_bytes(34), defaults.to_bytes(34)]);

    let (_, driver) = enumerate(&mut mock).expect("video function enumerates");
    let driver = driver.expect("video driver constructed");
    assert!(matches!(driver, Driver::Video(_)));
    assert_eq!(driver.properties().max_frame_size, Some(100_000));

    // Negotiated 2000 byte payloads fit alt 2 (3072 = 1024 x 3) but not
    // alt 1 (1024), so alt 2 is bound on the streaming interface.
    assert_eq!(mock.set_interfaces, vec![(1, 2)]);
    // Probe then commit were written, the commit keeping the negotiated
    // payload size since the endpoint covers it.
    assert_eq!(mock.set_cur.len(), 2);
    assert_eq!(mock.set_cur[0].0, 1);
    assert_eq!(mock.set_cur[1].0, 2);
    let commit = ProbeCommit::parse(&mock.set_cur[1].1).unwrap();
    assert_eq!(commit.max_payload_transfer_size, 2000);
    assert_eq!(commit.max_video_frame_size, 100_000);
}

#[test]
fn aborted_stream_drains_and_counts_frame_id_toggles() {
    let mut mock = MockTransport::new(device_descriptor(0xEF), uvc_config(), LinkSpeed::High);
    let defaults = ProbeCommit {
        format_index: 1,
        frame_index: 1,
        frame_interval: 333333,
        max_video_frame_size: 100_000,
        max_payload_transfer_size: 2000,
        ..ProbeCommit::default()
    };
    mock.probe_replies = VecDeque::from([defaults.to_bytes(34), defaults.to_bytes(34)]);

    let (_, driver) = enumerate(&mut mock).expect("video function enumerates");
    let mut video = match driver {
        Some(Driver::Video(video)) => video,
        other => panic!("expected video driver, got {:?}", other),
    };

    // Three payloads with Frame-ID bits 0, 1, 0: two toggles, two frames.
    // The fourth transfer never completes and stays in flight until the
    // time budget aborts the stream.
    mock.in_replies = VecDeque::from([
        InReply::Data(vec![2, 0x00]),
        InReply::Data(vec![2, 0x01]),
        InReply::Data(vec![2, 0x00]),
    ]);

    let stop = AtomicBool::new(false);
    let frames = video
        .stream(&mut mock, &stop, Some(Duration::from_millis(20)), Some(4))
        .expect("aborted stream still drains");
    assert_eq!(frames, 2);
    assert_eq!(video.frames_received(), 2);
    // The unharvested transfer was cancelled; nothing is left in flight.
    assert!(mock.pending_in.is_empty());
}
