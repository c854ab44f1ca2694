use std::io;
use thiserror::Error;

/// A single monitoring frame or control reply could not be decoded.
///
/// Decode errors are local to one datagram: the datagram is dropped and the
/// stream continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the field being read.
    #[error("datagram truncated: needed {needed} bytes at offset {offset}, only {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A field carried a value the protocol does not allow.
    #[error("invalid value for {field}: {description}")]
    InvalidFieldValue {
        field: &'static str,
        description: String,
    },

    /// A block id outside the known and vendor-extension ranges.
    #[error("unknown block type {0:#04X}")]
    UnknownBlockType(u8),
}

/// A `MonitoringFrameMessageBuilder` was asked to build an inconsistent message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// A required field was never set.
    #[error("monitoring frame incomplete: {0} not set")]
    Incomplete(&'static str),

    /// Measurements and intensities differ in length.
    #[error("{measurements} measurements but {intensities} intensities")]
    LengthMismatch {
        measurements: usize,
        intensities: usize,
    },

    /// A field was set to a value no frame can carry.
    #[error("invalid value for {field}: {description}")]
    InvalidField {
        field: &'static str,
        description: String,
    },
}

/// A scan round could not be completed. The round is discarded, the next
/// round is unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("scan {scan_counter}: round must start at {expected}, frame starts at {actual}")]
    UnexpectedStart {
        scan_counter: u32,
        expected: i32,
        actual: i32,
    },

    #[error("scan {scan_counter}: frame starts at {actual}, expected contiguous start {expected}")]
    NonContiguous {
        scan_counter: u32,
        expected: i32,
        actual: i32,
    },

    #[error("scan {scan_counter}: resolution changed from {expected} to {actual} within a round")]
    ResolutionMismatch {
        scan_counter: u32,
        expected: i32,
        actual: i32,
    },

    #[error("scan {scan_counter}: coverage ends at {end}, beyond range end {range_end}")]
    ExceedsRange {
        scan_counter: u32,
        end: i32,
        range_end: i32,
    },

    #[error("scan {scan_counter}: frame covers up to {end}, range ends at {range_end}")]
    Incomplete {
        scan_counter: u32,
        end: i32,
        range_end: i32,
    },

    #[error("scan {scan_counter}: round not completed within {timeout_ns} ns")]
    TimedOut { scan_counter: u32, timeout_ns: i64 },

    #[error("scan {scan_counter}: frame belongs to an already discarded round")]
    DiscardedRound { scan_counter: u32 },

    #[error("scan {scan_counter}: frame belongs to an already completed round")]
    DuplicateRound { scan_counter: u32 },
}

/// Outcome of a start/stop request that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("{0} request not acknowledged in time")]
    Timeout(&'static str),

    #[error("another request ({0}) is still pending")]
    Busy(&'static str),

    #[error("cannot {request} while {state}")]
    InvalidTransition {
        request: &'static str,
        state: &'static str,
    },

    #[error("{request} refused by device with result code {code:#010X}")]
    Refused { request: &'static str, code: u32 },

    #[error("{0} request cancelled")]
    Cancelled(&'static str),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// The scanner configuration is invalid. Fatal at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("scanner ip not set")]
    MissingScannerIp,

    #[error("invalid ip address {0:?}")]
    InvalidIp(String),

    #[error("invalid scan range [{start}, {end}]: {description}")]
    InvalidScanRange {
        start: i32,
        end: i32,
        description: &'static str,
    },

    #[error("invalid resolution {0}")]
    InvalidResolution(i32),

    #[error("port {0} used for more than one purpose")]
    PortConflict(u16),

    #[error("invalid {0} timeout")]
    InvalidTimeout(&'static str),
}

/// Represents errors that can occur during scanner operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("builder error: {0}")]
    Builder(#[from] BuilderError),

    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("control error: {0}")]
    Control(#[from] ControlError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// An I/O error occurred while communicating over the sockets.
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

/// A specialized `Result` type for scanner operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_message_names_offsets() {
        let err = DecodeError::Truncated {
            offset: 12,
            needed: 2,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "datagram truncated: needed 2 bytes at offset 12, only 1 available"
        );
    }

    #[test]
    fn wraps_sub_errors() {
        let err: Error = ControlError::Timeout("start").into();
        assert!(matches!(err, Error::Control(ControlError::Timeout("start"))));
        assert_eq!(
            err.to_string(),
            "control error: start request not acknowledged in time"
        );
    }
}
