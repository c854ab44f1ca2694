use crate::base::DecodeError;
use crate::parsers::check_payload_len;
use crate::types::PinState;
use log::trace;

/// Bytes per physical input bank.
pub const RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES: usize = 10;

/// Bytes of the logical input bank.
pub const RAW_CHUNK_LOGICAL_INPUT_SIGNALS_IN_BYTES: usize = 8;

/// Bytes of the output bank.
pub const RAW_CHUNK_OUTPUT_SIGNALS_IN_BYTES: usize = 4;

/// Size of the I/O block payload: three physical input banks, the logical
/// input bank and the output bank, in that order.
pub const IO_PIN_PAYLOAD_SIZE: usize = 3 * RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES
    + RAW_CHUNK_LOGICAL_INPUT_SIGNALS_IN_BYTES
    + RAW_CHUNK_OUTPUT_SIGNALS_IN_BYTES;

type PinNameFn = fn(usize, u8) -> Option<String>;

/// Snapshot of all digital signals of one monitoring frame.
///
/// Pins are ordered by byte, then bit. Bits without a signal assigned are
/// never part of a bank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PinData {
    pub physical_input_0: Vec<PinState>,
    pub physical_input_1: Vec<PinState>,
    pub physical_input_2: Vec<PinState>,
    pub logical_input: Vec<PinState>,
    pub output: Vec<PinState>,
}

impl PinData {
    /// A complete snapshot with every signal cleared.
    pub fn all_cleared() -> PinData {
        PinData {
            physical_input_0: cleared_bank(RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES, physical_input_name),
            physical_input_1: cleared_bank(RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES, physical_input_name),
            physical_input_2: cleared_bank(RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES, physical_input_name),
            logical_input: cleared_bank(RAW_CHUNK_LOGICAL_INPUT_SIGNALS_IN_BYTES, logical_input_name),
            output: cleared_bank(RAW_CHUNK_OUTPUT_SIGNALS_IN_BYTES, output_name),
        }
    }

    /// `true` if every bank holds exactly the signals the protocol defines.
    pub fn is_complete(&self) -> bool {
        let physical = RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES;
        bank_matches(&self.physical_input_0, physical, physical_input_name)
            && bank_matches(&self.physical_input_1, physical, physical_input_name)
            && bank_matches(&self.physical_input_2, physical, physical_input_name)
            && bank_matches(
                &self.logical_input,
                RAW_CHUNK_LOGICAL_INPUT_SIGNALS_IN_BYTES,
                logical_input_name,
            )
            && bank_matches(&self.output, RAW_CHUNK_OUTPUT_SIGNALS_IN_BYTES, output_name)
    }
}

/// Name of a physical input signal, `None` for unused bits.
pub fn physical_input_name(byte: usize, bit: u8) -> Option<String> {
    const SAFETY_INPUTS: [&str; 7] = [
        "Muting 1",
        "Muting 2",
        "Override 1",
        "Override 2",
        "Reset",
        "EDM 1",
        "EDM 2",
    ];
    match (byte, bit) {
        (0..=2, _) => Some(format!("Zone Set Switching Input {}", byte * 8 + bit as usize + 1)),
        (3, 0..=6) => Some(SAFETY_INPUTS[bit as usize].to_owned()),
        (4, 0) => Some("Restart Safety Function".to_owned()),
        (4, 1) => Some("Zone Set Enable".to_owned()),
        _ => None,
    }
}

/// Name of a logical input signal, `None` for unused bits.
pub fn logical_input_name(byte: usize, bit: u8) -> Option<String> {
    const CONTROL_INPUTS: [&str; 4] = [
        "Muting Enable 1",
        "Muting Enable 2",
        "Override Enable",
        "Reset Request",
    ];
    match (byte, bit) {
        (0..=1, _) => Some(format!("Zone Set {}", byte * 8 + bit as usize + 1)),
        (2, 0..=3) => Some(CONTROL_INPUTS[bit as usize].to_owned()),
        _ => None,
    }
}

/// Name of an output signal, `None` for unused bits.
pub fn output_name(byte: usize, bit: u8) -> Option<String> {
    const SAFETY_OUTPUTS: [&str; 5] = [
        "OSSD 1 Safe",
        "OSSD 2 Safe",
        "OSSD 3 Safe",
        "Warning 1",
        "Warning 2",
    ];
    const STATUS_OUTPUTS: [&str; 4] = [
        "Intrusion Detected",
        "Muting Active",
        "Override Active",
        "Reset Required",
    ];
    match (byte, bit) {
        (0, 0..=4) => Some(SAFETY_OUTPUTS[bit as usize].to_owned()),
        (1, 0..=3) => Some(STATUS_OUTPUTS[bit as usize].to_owned()),
        _ => None,
    }
}

fn pin_id(byte: usize, bit: u8) -> u32 {
    (byte * 8 + bit as usize) as u32
}

fn parse_bank(raw: &[u8], name_of: PinNameFn) -> Vec<PinState> {
    let mut pins = Vec::new();
    for (byte, value) in raw.iter().enumerate() {
        for bit in 0..8u8 {
            if let Some(name) = name_of(byte, bit) {
                pins.push(PinState::new(pin_id(byte, bit), name, value & (1 << bit) != 0));
            }
        }
    }
    pins
}

fn cleared_bank(bytes: usize, name_of: PinNameFn) -> Vec<PinState> {
    parse_bank(&vec![0u8; bytes], name_of)
}

fn bank_matches(pins: &[PinState], bytes: usize, name_of: PinNameFn) -> bool {
    let expected = cleared_bank(bytes, name_of);
    pins.len() == expected.len()
        && pins
            .iter()
            .zip(expected.iter())
            .all(|(pin, reference)| pin.id == reference.id && pin.name == reference.name)
}

fn write_bank(pins: &[PinState], bytes: usize, out: &mut Vec<u8>) {
    let mut raw = vec![0u8; bytes];
    for pin in pins.iter().filter(|pin| pin.value) {
        let byte = (pin.id / 8) as usize;
        if let Some(value) = raw.get_mut(byte) {
            *value |= 1 << (pin.id % 8);
        }
    }
    out.extend_from_slice(&raw);
}

/// Parses the I/O block into a complete `PinData` snapshot.
pub fn parse_io_pins(payload: &[u8]) -> Result<PinData, DecodeError> {
    check_payload_len("io pins", payload, IO_PIN_PAYLOAD_SIZE)?;
    let physical = RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES;
    let (physical_raw, rest) = payload.split_at(3 * physical);
    let (logical_raw, output_raw) = rest.split_at(RAW_CHUNK_LOGICAL_INPUT_SIGNALS_IN_BYTES);

    let pin_data = PinData {
        physical_input_0: parse_bank(&physical_raw[..physical], physical_input_name),
        physical_input_1: parse_bank(&physical_raw[physical..2 * physical], physical_input_name),
        physical_input_2: parse_bank(&physical_raw[2 * physical..], physical_input_name),
        logical_input: parse_bank(logical_raw, logical_input_name),
        output: parse_bank(output_raw, output_name),
    };
    trace!(
        "Parsed io pins: {} physical, {} logical, {} output",
        pin_data.physical_input_0.len() * 3,
        pin_data.logical_input.len(),
        pin_data.output.len()
    );
    Ok(pin_data)
}

/// Writes the I/O block payload for `pin_data`.
pub fn write_io_pins(pin_data: &PinData, out: &mut Vec<u8>) {
    let physical = RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES;
    write_bank(&pin_data.physical_input_0, physical, out);
    write_bank(&pin_data.physical_input_1, physical, out);
    write_bank(&pin_data.physical_input_2, physical, out);
    write_bank(&pin_data.logical_input, RAW_CHUNK_LOGICAL_INPUT_SIGNALS_IN_BYTES, out);
    write_bank(&pin_data.output, RAW_CHUNK_OUTPUT_SIGNALS_IN_BYTES, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_bits_are_filtered() {
        let pin_data = parse_io_pins(&[0xFF; IO_PIN_PAYLOAD_SIZE]).unwrap();
        assert_eq!(pin_data.physical_input_0.len(), 33);
        assert_eq!(pin_data.logical_input.len(), 20);
        assert_eq!(pin_data.output.len(), 9);
        assert!(pin_data.output.iter().all(|pin| pin.value));
        assert!(pin_data.is_complete());
    }

    #[test]
    fn set_bits_map_to_named_pins() {
        let mut payload = [0u8; IO_PIN_PAYLOAD_SIZE];
        payload[3] = 0b0001_0000;
        payload[3 * RAW_CHUNK_PHYSICAL_INPUT_SIGNALS_IN_BYTES + RAW_CHUNK_LOGICAL_INPUT_SIGNALS_IN_BYTES + 1] = 0b0000_0001;

        let pin_data = parse_io_pins(&payload).unwrap();
        let reset = pin_data
            .physical_input_0
            .iter()
            .find(|pin| pin.name == "Reset")
            .unwrap();
        assert!(reset.value);
        assert_eq!(reset.id, 28);
        let intrusion = pin_data
            .output
            .iter()
            .find(|pin| pin.name == "Intrusion Detected")
            .unwrap();
        assert!(intrusion.value);
        assert_eq!(pin_data.physical_input_0.iter().filter(|pin| pin.value).count(), 1);
    }

    #[test]
    fn written_payload_parses_back() {
        let mut pin_data = PinData::all_cleared();
        pin_data.physical_input_2[21].value = true;
        pin_data.logical_input[8].value = true;
        pin_data.output[2].value = true;

        let mut out = Vec::new();
        write_io_pins(&pin_data, &mut out);
        assert_eq!(out.len(), IO_PIN_PAYLOAD_SIZE);
        assert_eq!(parse_io_pins(&out).unwrap(), pin_data);
    }

    #[test]
    fn truncated_bank_is_incomplete() {
        let mut pin_data = PinData::all_cleared();
        pin_data.output.pop();
        assert!(!pin_data.is_complete());
        assert!(matches!(
            parse_io_pins(&[0u8; IO_PIN_PAYLOAD_SIZE - 4]),
            Err(DecodeError::InvalidFieldValue { .. })
        ));
    }
}
