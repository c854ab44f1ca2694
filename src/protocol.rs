use crate::base::DecodeError;
use crate::frame::{
    MonitoringFrameMessage, MonitoringFrameMessageBuilder, MAX_FRAME_ANGLE,
    MAX_MEASUREMENTS_PER_FRAME, MILLIMETRES_PER_METRE,
};
use crate::parsers::diagnostics::{parse_diagnostics, write_diagnostics};
use crate::parsers::encoder::{parse_encoder, write_encoder};
use crate::parsers::io_pins::{parse_io_pins, write_io_pins};
use crate::parsers::FieldReader;
use crate::types::TenthOfDegree;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::{error, trace};

/// Size of the fixed frame header.
pub const MONITORING_FRAME_HEADER_SIZE: usize = 12;

pub const BLOCK_ID_DIAGNOSTICS: u8 = 0x01;
pub const BLOCK_ID_IO_PINS: u8 = 0x02;
pub const BLOCK_ID_ENCODER: u8 = 0x03;
pub const BLOCK_ID_END_OF_FRAME: u8 = 0x09;

/// Block ids with this bit set are vendor extensions and skipped by length.
pub const BLOCK_ID_VENDOR_EXTENSION_MASK: u8 = 0x80;

pub const PRESENCE_FLAG_DIAGNOSTICS: u8 = 0x01;
pub const PRESENCE_FLAG_IO_PINS: u8 = 0x02;
pub const PRESENCE_FLAG_ENCODER: u8 = 0x04;
const PRESENCE_FLAGS_KNOWN: u8 =
    PRESENCE_FLAG_DIAGNOSTICS | PRESENCE_FLAG_IO_PINS | PRESENCE_FLAG_ENCODER;

/// Mask of the 14 intensity bits, the top two bits are reserved.
pub const INTENSITY_MASK: u16 = 0x3FFF;

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameHeader {
    scan_counter: u32,
    from_theta: TenthOfDegree,
    resolution: TenthOfDegree,
    active_zoneset: u8,
    presence_flags: u8,
    measurement_count: usize,
}

fn invalid(field: &'static str, description: String) -> DecodeError {
    DecodeError::InvalidFieldValue { field, description }
}

fn decode_header(reader: &mut FieldReader<'_>) -> Result<FrameHeader, DecodeError> {
    let header = FrameHeader {
        scan_counter: reader.read_u32()?,
        from_theta: TenthOfDegree::new(i32::from(reader.read_i16()?)),
        resolution: TenthOfDegree::new(i32::from(reader.read_u16()?)),
        active_zoneset: reader.read_u8()?,
        presence_flags: reader.read_u8()?,
        measurement_count: usize::from(reader.read_u16()?),
    };
    trace!("Decoded frame header: {:?}", header);

    if header.from_theta.value() < 0 {
        return Err(invalid("from_theta", format!("{} is negative", header.from_theta)));
    }
    if header.resolution.value() == 0 {
        return Err(invalid("resolution", "zero".to_owned()));
    }
    if header.presence_flags & !PRESENCE_FLAGS_KNOWN != 0 {
        return Err(invalid(
            "presence flags",
            format!("unknown bits in {:#04X}", header.presence_flags),
        ));
    }
    if header.measurement_count > MAX_MEASUREMENTS_PER_FRAME {
        return Err(invalid(
            "measurement count",
            format!("{} exceeds {}", header.measurement_count, MAX_MEASUREMENTS_PER_FRAME),
        ));
    }
    let end = header.from_theta + header.resolution * header.measurement_count as i32;
    if end > MAX_FRAME_ANGLE {
        return Err(invalid("measurement count", format!("frame reaches {}", end)));
    }
    Ok(header)
}

/// Decodes one monitoring frame from an untrusted UDP payload.
///
/// Every read is bounds-checked; a short buffer fails with
/// `DecodeError::Truncated`. A valid frame ends with the end-of-frame
/// block, so every strict prefix of a valid frame is `Truncated`.
pub fn decode_monitoring_frame(buf: &[u8]) -> Result<MonitoringFrameMessage, DecodeError> {
    trace!("decode_monitoring_frame called with {} bytes", buf.len());
    if buf.len() < MONITORING_FRAME_HEADER_SIZE {
        return Err(DecodeError::Truncated {
            offset: 0,
            needed: MONITORING_FRAME_HEADER_SIZE,
            available: buf.len(),
        });
    }

    let mut reader = FieldReader::new(buf);
    let header = decode_header(&mut reader)?;

    let raw_measurements = reader.take(header.measurement_count * 2)?;
    let measurements: Vec<f64> = raw_measurements
        .chunks_exact(2)
        .map(|raw| f64::from(BigEndian::read_u16(raw)) / MILLIMETRES_PER_METRE)
        .collect();

    let raw_intensities = reader.take(header.measurement_count * 2)?;
    let intensities: Vec<f64> = raw_intensities
        .chunks_exact(2)
        .map(|raw| f64::from(BigEndian::read_u16(raw) & INTENSITY_MASK))
        .collect();

    let mut diagnostics = None;
    let mut io_pin_data = None;
    let mut encoder_data = None;
    loop {
        let block_offset = reader.offset();
        let id = reader.read_u8()?;
        let len = usize::from(reader.read_u16()?);
        let payload = reader.take(len)?;
        trace!("Block {:#04X} with {} bytes at offset {}", id, len, block_offset);

        match id {
            BLOCK_ID_END_OF_FRAME => {
                if len != 0 {
                    return Err(invalid("end of frame", format!("carries {} bytes", len)));
                }
                break;
            }
            BLOCK_ID_DIAGNOSTICS => {
                expect_block(header.presence_flags, PRESENCE_FLAG_DIAGNOSTICS, diagnostics.is_some(), "diagnostics")?;
                diagnostics = Some(parse_diagnostics(payload)?);
            }
            BLOCK_ID_IO_PINS => {
                expect_block(header.presence_flags, PRESENCE_FLAG_IO_PINS, io_pin_data.is_some(), "io pins")?;
                io_pin_data = Some(parse_io_pins(payload)?);
            }
            BLOCK_ID_ENCODER => {
                expect_block(header.presence_flags, PRESENCE_FLAG_ENCODER, encoder_data.is_some(), "encoder")?;
                encoder_data = Some(parse_encoder(payload)?);
            }
            id if id & BLOCK_ID_VENDOR_EXTENSION_MASK != 0 => {
                trace!("Skipping vendor extension block {:#04X} ({} bytes)", id, len);
            }
            id => {
                error!("Unknown block type {:#04X} at offset {}", id, block_offset);
                return Err(DecodeError::UnknownBlockType(id));
            }
        }
    }

    check_declared(header.presence_flags, PRESENCE_FLAG_DIAGNOSTICS, diagnostics.is_some(), "diagnostics")?;
    check_declared(header.presence_flags, PRESENCE_FLAG_IO_PINS, io_pin_data.is_some(), "io pins")?;
    check_declared(header.presence_flags, PRESENCE_FLAG_ENCODER, encoder_data.is_some(), "encoder")?;
    if reader.remaining() > 0 {
        trace!("Ignoring {} bytes after end of frame", reader.remaining());
    }

    let mut builder = MonitoringFrameMessageBuilder::new()
        .scan_counter(header.scan_counter)
        .from_theta(header.from_theta)
        .resolution(header.resolution)
        .active_zoneset(header.active_zoneset)
        .measurements(measurements)
        .intensities(intensities)
        .diagnostic_messages(diagnostics.unwrap_or_default());
    if let Some(pins) = io_pin_data {
        builder = builder.io_pin_data(pins);
    }
    if let Some(encoder) = encoder_data {
        builder = builder.encoder_data(encoder);
    }
    builder
        .build()
        .map_err(|e| invalid("monitoring frame", e.to_string()))
}

fn expect_block(flags: u8, flag: u8, seen: bool, field: &'static str) -> Result<(), DecodeError> {
    if flags & flag == 0 {
        return Err(invalid(field, "block present but not declared".to_owned()));
    }
    if seen {
        return Err(invalid(field, "block repeated".to_owned()));
    }
    Ok(())
}

fn check_declared(flags: u8, flag: u8, seen: bool, field: &'static str) -> Result<(), DecodeError> {
    if flags & flag != 0 && !seen {
        return Err(invalid(field, "block declared but missing".to_owned()));
    }
    Ok(())
}

fn write_block(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    let _ = out.write_u16::<BigEndian>(payload.len() as u16);
    out.extend_from_slice(payload);
}

/// Encodes a monitoring frame into its wire representation.
///
/// The diagnostics block is only written when flags are raised; the I/O
/// and encoder blocks when the message carries them.
pub fn encode_monitoring_frame(msg: &MonitoringFrameMessage) -> Vec<u8> {
    let count = msg.measurements().len();
    let mut out = Vec::with_capacity(MONITORING_FRAME_HEADER_SIZE + count * 4 + 128);

    let mut flags = 0u8;
    if !msg.diagnostics().is_empty() {
        flags |= PRESENCE_FLAG_DIAGNOSTICS;
    }
    if msg.io_pin_data().is_some() {
        flags |= PRESENCE_FLAG_IO_PINS;
    }
    if msg.encoder_data().is_some() {
        flags |= PRESENCE_FLAG_ENCODER;
    }

    // Writes into a Vec cannot fail.
    let _ = out.write_u32::<BigEndian>(msg.scan_counter());
    let _ = out.write_i16::<BigEndian>(msg.from_theta().value() as i16);
    let _ = out.write_u16::<BigEndian>(msg.resolution().value() as u16);
    out.push(msg.active_zoneset());
    out.push(flags);
    let _ = out.write_u16::<BigEndian>(count as u16);
    for m in msg.measurements() {
        let _ = out.write_u16::<BigEndian>((m * MILLIMETRES_PER_METRE).round() as u16);
    }
    for i in msg.intensities() {
        let _ = out.write_u16::<BigEndian>(i.round() as u16 & INTENSITY_MASK);
    }

    let mut payload = Vec::new();
    if !msg.diagnostics().is_empty() {
        write_diagnostics(msg.diagnostics(), &mut payload);
        write_block(&mut out, BLOCK_ID_DIAGNOSTICS, &payload);
    }
    if let Some(pins) = msg.io_pin_data() {
        payload.clear();
        write_io_pins(pins, &mut payload);
        write_block(&mut out, BLOCK_ID_IO_PINS, &payload);
    }
    if let Some(encoder) = msg.encoder_data() {
        payload.clear();
        write_encoder(encoder, &mut payload);
        write_block(&mut out, BLOCK_ID_ENCODER, &payload);
    }
    write_block(&mut out, BLOCK_ID_END_OF_FRAME, &[]);

    trace!("Encoded monitoring frame of scan {} into {} bytes", msg.scan_counter(), out.len());
    out
}
