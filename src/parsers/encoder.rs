use crate::base::DecodeError;
use crate::parsers::{check_payload_len, FieldReader};
use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;

/// Size of the encoder block payload: two f64 channels.
pub const ENCODER_PAYLOAD_SIZE: usize = 16;

/// Readings of the auxiliary encoder channels, passed through unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EncoderData {
    pub encoder_1: f64,
    pub encoder_2: f64,
}

impl fmt::Display for EncoderData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EncoderData(encoder_1 = {}, encoder_2 = {})",
            self.encoder_1, self.encoder_2
        )
    }
}

pub fn parse_encoder(payload: &[u8]) -> Result<EncoderData, DecodeError> {
    check_payload_len("encoder", payload, ENCODER_PAYLOAD_SIZE)?;
    let mut reader = FieldReader::new(payload);
    Ok(EncoderData {
        encoder_1: reader.read_f64()?,
        encoder_2: reader.read_f64()?,
    })
}

pub fn write_encoder(data: &EncoderData, out: &mut Vec<u8>) {
    // writes into a Vec cannot fail
    let _ = out.write_f64::<BigEndian>(data.encoder_1);
    let _ = out.write_f64::<BigEndian>(data.encoder_2);
}
