use crate::base::DecodeError;
use crate::checksum::checksum_of;
use crate::parsers::FieldReader;
use log::{trace, warn};

/// Size of a control reply: crc32, reserved, opcode, result.
pub const PSENSCAN_REPLY_SIZE: usize = 16;

/// Result code of an accepted request.
pub const PSENSCAN_RESULT_ACCEPTED: u32 = 0;

/// Reply of the device to a start or stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Opcode of the request being answered.
    pub opcode: u32,
    /// `PSENSCAN_RESULT_ACCEPTED` or a device specific refusal code.
    pub result: u32,
}

impl Reply {
    pub fn is_accepted(&self) -> bool {
        self.result == PSENSCAN_RESULT_ACCEPTED
    }

    /// Decodes and verifies a control reply datagram.
    pub fn decode(buf: &[u8]) -> Result<Reply, DecodeError> {
        let mut reader = FieldReader::new(buf);
        let crc = reader.read_u32()?;
        let body = reader.take(PSENSCAN_REPLY_SIZE - 4)?;
        if reader.remaining() > 0 {
            trace!("Ignoring {} trailing reply bytes", reader.remaining());
        }

        let computed = checksum_of(body);
        if computed != crc {
            warn!(
                "Reply checksum mismatch: got {:08X}, computed {:08X}",
                crc, computed
            );
            return Err(DecodeError::InvalidFieldValue {
                field: "crc",
                description: format!("expected {:08X}, got {:08X}", computed, crc),
            });
        }

        let mut body = FieldReader::new(body);
        let _reserved = body.read_u32()?;
        let reply = Reply {
            opcode: body.read_u32()?,
            result: body.read_u32()?,
        };
        trace!("Decoded reply: {:?}", reply);
        Ok(reply)
    }

    /// Serializes the reply the way the device does.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = [0u8; PSENSCAN_REPLY_SIZE - 4];
        body[4..8].copy_from_slice(&self.opcode.to_be_bytes());
        body[8..12].copy_from_slice(&self.result.to_be_bytes());
        let mut out = Vec::with_capacity(PSENSCAN_REPLY_SIZE);
        out.extend_from_slice(&checksum_of(&body).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::{PSENSCAN_OPCODE_START, PSENSCAN_OPCODE_STOP};

    #[test]
    fn decodes_accepted_reply() {
        let reply = Reply {
            opcode: PSENSCAN_OPCODE_START,
            result: PSENSCAN_RESULT_ACCEPTED,
        };
        let decoded = Reply::decode(&reply.encode()).unwrap();
        assert_eq!(decoded, reply);
        assert!(decoded.is_accepted());
    }

    #[test]
    fn corrupted_reply_fails_checksum() {
        let mut bytes = Reply {
            opcode: PSENSCAN_OPCODE_STOP,
            result: 3,
        }
        .encode();
        bytes[15] ^= 0x01;
        assert!(matches!(
            Reply::decode(&bytes),
            Err(DecodeError::InvalidFieldValue { field: "crc", .. })
        ));
    }

    #[test]
    fn short_reply_is_truncated() {
        let bytes = Reply {
            opcode: PSENSCAN_OPCODE_STOP,
            result: 0,
        }
        .encode();
        assert!(matches!(
            Reply::decode(&bytes[..10]),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
