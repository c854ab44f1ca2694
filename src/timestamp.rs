use crate::types::{ScanRange, TenthOfDegree};
use log::trace;
use std::time::Duration;

/// Tenths of a degree in one full revolution.
const FULL_REVOLUTION: f64 = 3600.0;

/// Back-dates a frame's arrival time to the time the first ray of its scan
/// round was measured.
///
/// The device sends a frame right after measuring its last ray, so the
/// arrival time approximates that ray. The time the mirror needed to sweep
/// from the scan range start to the end of the frame is subtracted, assuming
/// constant angular velocity.
///
/// # Arguments
///
/// * `arrival_ns` - Arrival time of the frame in nanoseconds.
/// * `from_theta` - Angle of the frame's first ray.
/// * `resolution` - Angular step between rays.
/// * `num_measurements` - Number of rays in the frame.
/// * `scan_range` - Configured scan range, its start is the first ray of a round.
/// * `rotation_period` - Time of one revolution.
pub fn compute_first_ray_timestamp(
    arrival_ns: i64,
    from_theta: TenthOfDegree,
    resolution: TenthOfDegree,
    num_measurements: usize,
    scan_range: ScanRange,
    rotation_period: Duration,
) -> i64 {
    let last_ray_end = from_theta + resolution * num_measurements as i32;
    let swept = (last_ray_end - scan_range.start()).value();
    let period_ns = rotation_period.as_nanos() as f64;
    let offset_ns = (f64::from(swept) / FULL_REVOLUTION * period_ns).round() as i64;
    trace!(
        "Frame ending at {} swept {} since {}, back-dating by {} ns",
        last_ray_end,
        swept,
        scan_range.start(),
        offset_ns
    );
    arrival_ns - offset_ns
}
