use crate::base::ConfigurationError;
use crate::parsers::diagnostics::DiagnosticMessage;
use crate::parsers::io_pins::PinData;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Angle in the scanner's native unit of a tenth of a degree.
///
/// Arithmetic is exact integer arithmetic. Use `to_deg()`/`to_rad()` for
/// floating-point access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TenthOfDegree(i32);

impl TenthOfDegree {
    /// Creates an angle from a raw tenth-of-degree value.
    #[inline]
    pub const fn new(tenths: i32) -> TenthOfDegree {
        TenthOfDegree(tenths)
    }

    /// Creates an angle from degrees, rounded to the nearest tenth.
    #[inline]
    pub fn from_deg(deg: f64) -> TenthOfDegree {
        TenthOfDegree((deg * 10.0).round() as i32)
    }

    /// Returns the raw tenth-of-degree value.
    #[inline]
    pub const fn value(&self) -> i32 {
        self.0
    }

    /// Returns the angle in degrees.
    #[inline]
    pub fn to_deg(&self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// Returns the angle in radians.
    #[inline]
    pub fn to_rad(&self) -> f64 {
        self.to_deg().to_radians()
    }

    /// `self + rhs`, `None` on overflow.
    #[inline]
    pub fn checked_add(self, rhs: TenthOfDegree) -> Option<TenthOfDegree> {
        self.0.checked_add(rhs.0).map(TenthOfDegree)
    }

    /// `self * rhs`, `None` on overflow.
    #[inline]
    pub fn checked_mul(self, rhs: i32) -> Option<TenthOfDegree> {
        self.0.checked_mul(rhs).map(TenthOfDegree)
    }
}

impl fmt::Display for TenthOfDegree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°", self.to_deg())
    }
}

impl Add for TenthOfDegree {
    type Output = TenthOfDegree;

    fn add(self, rhs: TenthOfDegree) -> TenthOfDegree {
        TenthOfDegree(self.0 + rhs.0)
    }
}

impl Sub for TenthOfDegree {
    type Output = TenthOfDegree;

    fn sub(self, rhs: TenthOfDegree) -> TenthOfDegree {
        TenthOfDegree(self.0 - rhs.0)
    }
}

impl Mul<i32> for TenthOfDegree {
    type Output = TenthOfDegree;

    fn mul(self, rhs: i32) -> TenthOfDegree {
        TenthOfDegree(self.0 * rhs)
    }
}

impl Div<i32> for TenthOfDegree {
    type Output = TenthOfDegree;

    fn div(self, rhs: i32) -> TenthOfDegree {
        TenthOfDegree(self.0 / rhs)
    }
}

/// Number of whole steps of `rhs` in `self`.
impl Div for TenthOfDegree {
    type Output = i32;

    fn div(self, rhs: TenthOfDegree) -> i32 {
        self.0 / rhs.0
    }
}

/// Angular window a complete scan covers, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanRange {
    start: TenthOfDegree,
    end: TenthOfDegree,
}

impl ScanRange {
    /// Creates a scan range, rejecting empty, inverted or negative windows.
    ///
    /// # Arguments
    ///
    /// * `start` - First angle of the scan.
    /// * `end` - Angle the scan must reach.
    pub fn new(start: TenthOfDegree, end: TenthOfDegree) -> Result<ScanRange, ConfigurationError> {
        if start.value() < 0 {
            return Err(ConfigurationError::InvalidScanRange {
                start: start.value(),
                end: end.value(),
                description: "start must not be negative",
            });
        }
        if start >= end {
            return Err(ConfigurationError::InvalidScanRange {
                start: start.value(),
                end: end.value(),
                description: "start must be less than end",
            });
        }
        Ok(ScanRange { start, end })
    }

    #[inline]
    pub fn start(&self) -> TenthOfDegree {
        self.start
    }

    #[inline]
    pub fn end(&self) -> TenthOfDegree {
        self.end
    }

    /// Angular span `end - start`.
    #[inline]
    pub fn span(&self) -> TenthOfDegree {
        self.end - self.start
    }

    /// Number of rays of width `resolution` needed to cover the whole span.
    pub fn ray_count(&self, resolution: TenthOfDegree) -> usize {
        let span = self.span().value();
        let res = resolution.value().max(1);
        ((span + res - 1) / res) as usize
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// State of one digital signal reported by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinState {
    /// Position of the signal in its bank, `byte * 8 + bit`.
    pub id: u32,
    /// Human-readable signal name.
    pub name: String,
    /// `true` if the signal is set.
    pub value: bool,
}

impl PinState {
    pub fn new(id: u32, name: impl Into<String>, value: bool) -> PinState {
        PinState {
            id,
            name: name.into(),
            value,
        }
    }
}

/// I/O snapshot of one monitoring frame together with that frame's arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct IOState {
    pub pin_data: PinData,
    pub timestamp: i64,
}

/// One fully assembled scan round.
///
/// Only produced by a completed scan round. Measurements are in metres,
/// ordered by ascending angle starting at `min_angle()`.
#[derive(Debug, Clone, PartialEq)]
pub struct LaserScan {
    timestamp: i64,
    scan_counter: u32,
    min_angle: TenthOfDegree,
    max_angle: TenthOfDegree,
    resolution: TenthOfDegree,
    active_zoneset: u8,
    measurements: Vec<f64>,
    intensities: Vec<f64>,
    diagnostics: Vec<DiagnosticMessage>,
    io_states: Vec<IOState>,
}

impl LaserScan {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        timestamp: i64,
        scan_counter: u32,
        min_angle: TenthOfDegree,
        resolution: TenthOfDegree,
        active_zoneset: u8,
        measurements: Vec<f64>,
        intensities: Vec<f64>,
        diagnostics: Vec<DiagnosticMessage>,
        io_states: Vec<IOState>,
    ) -> LaserScan {
        let rays = measurements.len().max(1) as i32;
        LaserScan {
            timestamp,
            scan_counter,
            min_angle,
            max_angle: min_angle + resolution * (rays - 1),
            resolution,
            active_zoneset,
            measurements,
            intensities,
            diagnostics,
            io_states,
        }
    }

    /// Time of the first ray in nanoseconds since the UNIX epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn scan_counter(&self) -> u32 {
        self.scan_counter
    }

    /// Angle of the first ray.
    pub fn min_angle(&self) -> TenthOfDegree {
        self.min_angle
    }

    /// Angle of the last ray.
    pub fn max_angle(&self) -> TenthOfDegree {
        self.max_angle
    }

    pub fn resolution(&self) -> TenthOfDegree {
        self.resolution
    }

    pub fn active_zoneset(&self) -> u8 {
        self.active_zoneset
    }

    pub fn measurements(&self) -> &[f64] {
        &self.measurements
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn diagnostics(&self) -> &[DiagnosticMessage] {
        &self.diagnostics
    }

    /// I/O snapshots of every constituent frame that carried I/O, in angular order.
    pub fn io_states(&self) -> &[IOState] {
        &self.io_states
    }

    /// Most recent I/O snapshot of the round.
    pub fn current_io_state(&self) -> Option<&IOState> {
        self.io_states.last()
    }
}
