use crate::checksum::checksum_of;
use crate::types::{ScanRange, TenthOfDegree};
use byteorder::{BigEndian, WriteBytesExt};
use log::trace;
use std::net::Ipv4Addr;

/// Opcode of the request that starts monitoring frame streaming.
pub const PSENSCAN_OPCODE_START: u32 = 0x35;

/// Opcode of the request that stops monitoring frame streaming.
pub const PSENSCAN_OPCODE_STOP: u32 = 0x30;

/// Size of the common request header: crc32, sequence, reserved, opcode.
pub const PSENSCAN_REQUEST_HEADER_SIZE: usize = 20;

/// Size of a complete start request.
pub const PSENSCAN_START_REQUEST_SIZE: usize = PSENSCAN_REQUEST_HEADER_SIZE + 14;

/// Parameters carried by a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    /// Address the device streams monitoring frames to.
    pub host_ip: Ipv4Addr,
    pub host_data_port: u16,
    pub diagnostics_enabled: bool,
    pub fragmented_scan: bool,
    pub scan_range: ScanRange,
    pub resolution: TenthOfDegree,
}

/// A request sent on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Start(StartRequest),
    Stop,
}

impl Request {
    pub fn opcode(&self) -> u32 {
        match self {
            Request::Start(_) => PSENSCAN_OPCODE_START,
            Request::Stop => PSENSCAN_OPCODE_STOP,
        }
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Start(_) => "start",
            Request::Stop => "stop",
        }
    }

    /// Serializes the request, checksum first.
    ///
    /// # Arguments
    ///
    /// * `sequence` - Sequence number of this request, incremented per request.
    pub fn encode(&self, sequence: u32) -> Vec<u8> {
        // Writes into a Vec cannot fail.
        let mut body = Vec::with_capacity(PSENSCAN_START_REQUEST_SIZE - 4);
        let _ = body.write_u32::<BigEndian>(sequence);
        let _ = body.write_u64::<BigEndian>(0);
        let _ = body.write_u32::<BigEndian>(self.opcode());
        if let Request::Start(start) = self {
            let _ = body.write_u32::<BigEndian>(u32::from(start.host_ip));
            let _ = body.write_u16::<BigEndian>(start.host_data_port);
            body.push(u8::from(start.diagnostics_enabled));
            body.push(u8::from(start.fragmented_scan));
            let _ = body.write_i16::<BigEndian>(start.scan_range.start().value() as i16);
            let _ = body.write_i16::<BigEndian>(start.scan_range.end().value() as i16);
            let _ = body.write_u16::<BigEndian>(start.resolution.value() as u16);
        }

        let mut out = Vec::with_capacity(body.len() + 4);
        let _ = out.write_u32::<BigEndian>(checksum_of(&body));
        out.extend_from_slice(&body);
        trace!(
            "Encoded {} request #{} ({} bytes): {:02X?}",
            self.name(),
            sequence,
            out.len(),
            out
        );
        out
    }
}
