use crate::base::BuilderError;
use crate::parsers::diagnostics::DiagnosticMessage;
use crate::parsers::encoder::EncoderData;
use crate::parsers::io_pins::PinData;
use crate::types::TenthOfDegree;
use log::trace;

/// Largest number of rays a single frame may carry (one full turn at 0.1°).
pub const MAX_MEASUREMENTS_PER_FRAME: usize = 3600;

/// Largest angle a frame may reach.
pub const MAX_FRAME_ANGLE: TenthOfDegree = TenthOfDegree::new(3600);

/// Measurements are transmitted in millimetres.
pub const MILLIMETRES_PER_METRE: f64 = 1000.0;

/// Largest measurement the wire format can carry, in metres.
pub const MAX_MEASUREMENT: f64 = u16::MAX as f64 / MILLIMETRES_PER_METRE;

/// Largest intensity value, only 14 of the 16 transmitted bits are used.
pub const MAX_INTENSITY: f64 = 16383.0;

/// One decoded monitoring frame: a partial angular slice of a scan round
/// plus the diagnostics and I/O side channels.
///
/// Construct with `MonitoringFrameMessageBuilder`. `measurements` and
/// `intensities` always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringFrameMessage {
    scan_counter: u32,
    from_theta: TenthOfDegree,
    resolution: TenthOfDegree,
    active_zoneset: u8,
    measurements: Vec<f64>,
    intensities: Vec<f64>,
    diagnostics: Vec<DiagnosticMessage>,
    io_pin_data: Option<PinData>,
    encoder_data: Option<EncoderData>,
}

impl MonitoringFrameMessage {
    pub fn scan_counter(&self) -> u32 {
        self.scan_counter
    }

    /// Angle of the frame's first ray.
    pub fn from_theta(&self) -> TenthOfDegree {
        self.from_theta
    }

    pub fn resolution(&self) -> TenthOfDegree {
        self.resolution
    }

    pub fn active_zoneset(&self) -> u8 {
        self.active_zoneset
    }

    /// Ranges in metres.
    pub fn measurements(&self) -> &[f64] {
        &self.measurements
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    /// Raised diagnostic flags, sorted and free of duplicates.
    pub fn diagnostics(&self) -> &[DiagnosticMessage] {
        &self.diagnostics
    }

    pub fn io_pin_data(&self) -> Option<&PinData> {
        self.io_pin_data.as_ref()
    }

    pub fn encoder_data(&self) -> Option<&EncoderData> {
        self.encoder_data.as_ref()
    }

    /// Angle just past the frame's last ray, `from_theta + n * resolution`.
    pub fn end_theta(&self) -> TenthOfDegree {
        self.from_theta + self.resolution * self.measurements.len() as i32
    }
}

/// A monitoring frame paired with the arrival time of its datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringFrameMessageStamped {
    pub msg: MonitoringFrameMessage,
    /// Arrival time in nanoseconds since the UNIX epoch.
    pub stamp: i64,
}

impl MonitoringFrameMessageStamped {
    pub fn new(msg: MonitoringFrameMessage, stamp: i64) -> MonitoringFrameMessageStamped {
        MonitoringFrameMessageStamped { msg, stamp }
    }
}

/// Incremental, validating constructor for `MonitoringFrameMessage`.
///
/// Fields may be set in any order; consistency is only checked by `build()`.
///
/// # Example
/// ```
/// # use psenscan::{MonitoringFrameMessageBuilder, TenthOfDegree};
/// let msg = MonitoringFrameMessageBuilder::new()
///     .scan_counter(42)
///     .from_theta(TenthOfDegree::new(0))
///     .resolution(TenthOfDegree::new(10))
///     .measurements(vec![1.0, 2.5])
///     .intensities(vec![100.0, 200.0])
///     .build()
///     .unwrap();
/// assert_eq!(msg.end_theta(), TenthOfDegree::new(20));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MonitoringFrameMessageBuilder {
    scan_counter: Option<u32>,
    from_theta: Option<TenthOfDegree>,
    resolution: Option<TenthOfDegree>,
    active_zoneset: u8,
    measurements: Option<Vec<f64>>,
    intensities: Option<Vec<f64>>,
    diagnostics: Vec<DiagnosticMessage>,
    io_pin_data: Option<PinData>,
    encoder_data: Option<EncoderData>,
}

impl MonitoringFrameMessageBuilder {
    pub fn new() -> MonitoringFrameMessageBuilder {
        MonitoringFrameMessageBuilder::default()
    }

    pub fn scan_counter(mut self, scan_counter: u32) -> Self {
        self.scan_counter = Some(scan_counter);
        self
    }

    pub fn from_theta(mut self, from_theta: TenthOfDegree) -> Self {
        self.from_theta = Some(from_theta);
        self
    }

    pub fn resolution(mut self, resolution: TenthOfDegree) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn active_zoneset(mut self, active_zoneset: u8) -> Self {
        self.active_zoneset = active_zoneset;
        self
    }

    pub fn measurements(mut self, measurements: Vec<f64>) -> Self {
        self.measurements = Some(measurements);
        self
    }

    pub fn intensities(mut self, intensities: Vec<f64>) -> Self {
        self.intensities = Some(intensities);
        self
    }

    pub fn diagnostic_messages(mut self, diagnostics: Vec<DiagnosticMessage>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn io_pin_data(mut self, io_pin_data: PinData) -> Self {
        self.io_pin_data = Some(io_pin_data);
        self
    }

    pub fn encoder_data(mut self, encoder_data: EncoderData) -> Self {
        self.encoder_data = Some(encoder_data);
        self
    }

    /// Validates the accumulated fields and produces the message.
    pub fn build(self) -> Result<MonitoringFrameMessage, BuilderError> {
        let scan_counter = self.scan_counter.ok_or(BuilderError::Incomplete("scan counter"))?;
        let from_theta = self.from_theta.ok_or(BuilderError::Incomplete("from_theta"))?;
        let resolution = self.resolution.ok_or(BuilderError::Incomplete("resolution"))?;
        let measurements = self.measurements.ok_or(BuilderError::Incomplete("measurements"))?;
        let intensities = self.intensities.ok_or(BuilderError::Incomplete("intensities"))?;

        if measurements.len() != intensities.len() {
            return Err(BuilderError::LengthMismatch {
                measurements: measurements.len(),
                intensities: intensities.len(),
            });
        }
        if resolution.value() <= 0 || resolution.value() > i32::from(u16::MAX) {
            return Err(invalid("resolution", format!("{} outside 0.1°..=6553.5°", resolution)));
        }
        if from_theta.value() < 0 || from_theta.value() > i32::from(i16::MAX) {
            return Err(invalid("from_theta", format!("{} outside 0.0°..=3276.7°", from_theta)));
        }
        if measurements.len() > MAX_MEASUREMENTS_PER_FRAME {
            return Err(invalid(
                "measurements",
                format!("{} rays exceed {}", measurements.len(), MAX_MEASUREMENTS_PER_FRAME),
            ));
        }
        let end = resolution
            .checked_mul(measurements.len() as i32)
            .and_then(|span| from_theta.checked_add(span))
            .filter(|end| *end <= MAX_FRAME_ANGLE)
            .ok_or_else(|| invalid("measurements", format!("frame reaches past {}", MAX_FRAME_ANGLE)))?;
        trace!("Frame spans {} to {}", from_theta, end);

        if let Some(bad) = measurements.iter().find(|m| !(0.0..=MAX_MEASUREMENT).contains(*m)) {
            return Err(invalid("measurements", format!("{} out of range", bad)));
        }
        if let Some(bad) = measurements.iter().find(|m| !is_whole_millimetre(**m)) {
            return Err(invalid("measurements", format!("{} is not a whole millimetre", bad)));
        }
        if let Some(bad) = intensities.iter().find(|i| !(0.0..=MAX_INTENSITY).contains(*i)) {
            return Err(invalid("intensities", format!("{} out of range", bad)));
        }
        if let Some(bad) = intensities.iter().find(|i| i.fract() != 0.0) {
            return Err(invalid("intensities", format!("{} is not an integer", bad)));
        }
        if let Some(bad) = self.diagnostics.iter().find(|d| !d.location.is_valid()) {
            return Err(invalid("diagnostics", format!("{} outside bitmap", bad)));
        }
        if matches!(&self.io_pin_data, Some(pins) if !pins.is_complete()) {
            return Err(invalid("io pin data", "incomplete pin banks".to_owned()));
        }

        let mut diagnostics = self.diagnostics;
        diagnostics.sort();
        diagnostics.dedup();

        trace!(
            "Built monitoring frame: scan {}, {} rays from {}",
            scan_counter,
            measurements.len(),
            from_theta
        );
        Ok(MonitoringFrameMessage {
            scan_counter,
            from_theta,
            resolution,
            active_zoneset: self.active_zoneset,
            measurements,
            intensities,
            diagnostics,
            io_pin_data: self.io_pin_data,
            encoder_data: self.encoder_data,
        })
    }
}

/// True if `metres` survives the millimetre encoding unchanged.
fn is_whole_millimetre(metres: f64) -> bool {
    (metres * MILLIMETRES_PER_METRE).round() / MILLIMETRES_PER_METRE == metres
}

fn invalid(field: &'static str, description: String) -> BuilderError {
    BuilderError::InvalidField { field, description }
}
