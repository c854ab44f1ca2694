use crate::base::DecodeError;
use crate::parsers::check_payload_len;
use log::{trace, warn};
use std::fmt;

/// Size of one device's diagnostic bitmap in bytes.
pub const DIAGNOSTIC_BYTES_PER_DEVICE: usize = 9;

/// Size of the diagnostic block payload: one bitmap per device slot.
pub const DIAGNOSTIC_PAYLOAD_SIZE: usize = DIAGNOSTIC_BYTES_PER_DEVICE * ScannerId::ALL.len();

/// Device or module a diagnostic flag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScannerId {
    Master,
    Slave0,
    Slave1,
    Slave2,
}

impl ScannerId {
    /// All device slots in wire order.
    pub const ALL: [ScannerId; 4] = [
        ScannerId::Master,
        ScannerId::Slave0,
        ScannerId::Slave1,
        ScannerId::Slave2,
    ];

    fn slot(&self) -> usize {
        match self {
            ScannerId::Master => 0,
            ScannerId::Slave0 => 1,
            ScannerId::Slave1 => 2,
            ScannerId::Slave2 => 3,
        }
    }
}

impl fmt::Display for ScannerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScannerId::Master => "master",
            ScannerId::Slave0 => "slave0",
            ScannerId::Slave1 => "slave1",
            ScannerId::Slave2 => "slave2",
        };
        f.write_str(name)
    }
}

/// Bit position of a diagnostic flag within a device's bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ErrorLocation {
    pub byte: usize,
    pub bit: u8,
}

impl ErrorLocation {
    pub const fn new(byte: usize, bit: u8) -> ErrorLocation {
        ErrorLocation { byte, bit }
    }

    /// `true` if the location lies inside a device bitmap.
    pub fn is_valid(&self) -> bool {
        self.byte < DIAGNOSTIC_BYTES_PER_DEVICE && self.bit < 8
    }
}

/// One raised diagnostic flag.
///
/// Ordering is by device, then byte, then bit, which is also the order the
/// flags appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiagnosticMessage {
    pub scanner_id: ScannerId,
    pub location: ErrorLocation,
}

impl DiagnosticMessage {
    pub const fn new(scanner_id: ScannerId, location: ErrorLocation) -> DiagnosticMessage {
        DiagnosticMessage {
            scanner_id,
            location,
        }
    }
}

impl fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: byte {} bit {}",
            self.scanner_id, self.location.byte, self.location.bit
        )
    }
}

/// Parses the diagnostic block into one message per set bit.
pub fn parse_diagnostics(payload: &[u8]) -> Result<Vec<DiagnosticMessage>, DecodeError> {
    check_payload_len("diagnostics", payload, DIAGNOSTIC_PAYLOAD_SIZE)?;
    let mut messages = Vec::new();
    for (id, bitmap) in ScannerId::ALL
        .iter()
        .zip(payload.chunks_exact(DIAGNOSTIC_BYTES_PER_DEVICE))
    {
        for (byte, value) in bitmap.iter().enumerate() {
            for bit in 0..8u8 {
                if value & (1 << bit) != 0 {
                    messages.push(DiagnosticMessage::new(*id, ErrorLocation::new(byte, bit)));
                }
            }
        }
    }
    trace!("Parsed {} diagnostic flags", messages.len());
    Ok(messages)
}

/// Writes the diagnostic block payload for `messages`.
pub fn write_diagnostics(messages: &[DiagnosticMessage], out: &mut Vec<u8>) {
    let mut payload = [0u8; DIAGNOSTIC_PAYLOAD_SIZE];
    for msg in messages {
        if !msg.location.is_valid() {
            warn!("Skipping diagnostic flag outside bitmap: {}", msg);
            continue;
        }
        let index = msg.scanner_id.slot() * DIAGNOSTIC_BYTES_PER_DEVICE + msg.location.byte;
        payload[index] |= 1 << msg.location.bit;
    }
    out.extend_from_slice(&payload);
}
