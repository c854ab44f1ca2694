use crate::base::AssemblyError;
use crate::config::ScannerConfiguration;
use crate::frame::MonitoringFrameMessageStamped;
use crate::internals::{PSENSCAN_DEFAULT_ROTATION_PERIOD, PSENSCAN_DEFAULT_ROUND_TIMEOUT};
use crate::timestamp::compute_first_ray_timestamp;
use crate::types::{IOState, LaserScan, ScanRange, TenthOfDegree};
use log::{debug, trace, warn};
use std::time::Duration;

/// Frames of the scan round currently being collected.
#[derive(Debug)]
struct Round {
    scan_counter: u32,
    resolution: TenthOfDegree,
    /// Angle the next frame must start at.
    next_theta: TenthOfDegree,
    deadline: i64,
    frames: Vec<MonitoringFrameMessageStamped>,
}

#[derive(Debug)]
enum RoundState {
    Empty,
    Collecting(Round),
    /// Round was dropped; its remaining frames are ignored.
    Discarded(u32),
    /// Round was emitted; a repeated counter is a retransmission.
    Completed(u32),
}

/// Stitches the monitoring frames of one scan round into a `LaserScan`.
///
/// Frames must arrive in ascending angular order, starting at the scan
/// range start, each one starting where the previous one ended. Anything
/// else discards the round: a partial scan is never emitted.
#[derive(Debug)]
pub struct ScanRoundAssembler {
    scan_range: ScanRange,
    fragmented_scan: bool,
    rotation_period: Duration,
    round_timeout_ns: i64,
    state: RoundState,
}

impl ScanRoundAssembler {
    /// Creates an assembler with the default rotation period and round timeout.
    ///
    /// # Arguments
    ///
    /// * `scan_range` - Angular window a complete round must cover.
    /// * `fragmented_scan` - Whether a round may be split over several frames.
    pub fn new(scan_range: ScanRange, fragmented_scan: bool) -> ScanRoundAssembler {
        ScanRoundAssembler {
            scan_range,
            fragmented_scan,
            rotation_period: PSENSCAN_DEFAULT_ROTATION_PERIOD,
            round_timeout_ns: PSENSCAN_DEFAULT_ROUND_TIMEOUT.as_nanos() as i64,
            state: RoundState::Empty,
        }
    }

    pub fn from_config(config: &ScannerConfiguration) -> ScanRoundAssembler {
        ScanRoundAssembler::new(config.scan_range(), config.fragmented_scan())
            .with_timing(config.rotation_period(), config.round_timeout())
    }

    /// Replaces the rotation period used for timestamps and the round timeout.
    pub fn with_timing(mut self, rotation_period: Duration, round_timeout: Duration) -> Self {
        self.rotation_period = rotation_period;
        self.round_timeout_ns = round_timeout.as_nanos() as i64;
        self
    }

    /// Counter of the round currently being collected, if any.
    pub fn current_scan_counter(&self) -> Option<u32> {
        match &self.state {
            RoundState::Collecting(round) => Some(round.scan_counter),
            _ => None,
        }
    }

    /// Forgets any round in flight, e.g. after the scanner was restarted.
    pub fn reset(&mut self) {
        if let RoundState::Collecting(round) = &self.state {
            debug!("Dropping scan {} on reset", round.scan_counter);
        }
        self.state = RoundState::Empty;
    }

    /// Feeds one frame into the assembler.
    ///
    /// Returns `Ok(Some(scan))` when the frame completes a round, `Ok(None)`
    /// while a round is still being collected.
    pub fn push(
        &mut self,
        frame: MonitoringFrameMessageStamped,
    ) -> Result<Option<LaserScan>, AssemblyError> {
        let counter = frame.msg.scan_counter();
        trace!(
            "Assembling scan {}: {} rays from {} at {}",
            counter,
            frame.msg.measurements().len(),
            frame.msg.from_theta(),
            frame.stamp
        );

        if self.is_expired(frame.stamp) {
            let error = self.time_out();
            if counter == round_counter(&error) {
                return Err(error);
            }
        }

        match &self.state {
            RoundState::Discarded(c) if *c == counter => {
                trace!("Dropping frame of discarded scan {}", counter);
                return Err(AssemblyError::DiscardedRound {
                    scan_counter: counter,
                });
            }
            RoundState::Completed(c) if *c == counter => {
                warn!("Dropping repeated frame of completed scan {}", counter);
                return Err(AssemblyError::DuplicateRound {
                    scan_counter: counter,
                });
            }
            _ => {}
        }

        if !self.fragmented_scan {
            return self.single_frame_round(frame);
        }

        let state = std::mem::replace(&mut self.state, RoundState::Empty);
        match state {
            RoundState::Collecting(round) if round.scan_counter == counter => {
                self.extend_round(round, frame)
            }
            RoundState::Collecting(round) => {
                warn!(
                    "Discarding incomplete scan {} ({} frames, reached {}): scan {} started",
                    round.scan_counter,
                    round.frames.len(),
                    round.next_theta,
                    counter
                );
                self.open_round(frame)
            }
            _ => self.open_round(frame),
        }
    }

    /// Discards the round in flight if its deadline has passed.
    ///
    /// # Arguments
    ///
    /// * `now` - Current time in nanoseconds, same clock as the frame stamps.
    pub fn check_deadline(&mut self, now: i64) -> Result<(), AssemblyError> {
        if self.is_expired(now) {
            return Err(self.time_out());
        }
        Ok(())
    }

    fn is_expired(&self, now: i64) -> bool {
        matches!(&self.state, RoundState::Collecting(round) if now > round.deadline)
    }

    fn time_out(&mut self) -> AssemblyError {
        let scan_counter = match &self.state {
            RoundState::Collecting(round) => round.scan_counter,
            _ => 0,
        };
        warn!(
            "Scan {} not completed within {} ns, discarding",
            scan_counter, self.round_timeout_ns
        );
        self.state = RoundState::Discarded(scan_counter);
        AssemblyError::TimedOut {
            scan_counter,
            timeout_ns: self.round_timeout_ns,
        }
    }

    fn discard(&mut self, error: AssemblyError) -> Result<Option<LaserScan>, AssemblyError> {
        warn!("Discarding scan round: {}", error);
        self.state = RoundState::Discarded(round_counter(&error));
        Err(error)
    }

    fn single_frame_round(
        &mut self,
        frame: MonitoringFrameMessageStamped,
    ) -> Result<Option<LaserScan>, AssemblyError> {
        let counter = frame.msg.scan_counter();
        if frame.msg.from_theta() != self.scan_range.start() {
            return self.discard(AssemblyError::UnexpectedStart {
                scan_counter: counter,
                expected: self.scan_range.start().value(),
                actual: frame.msg.from_theta().value(),
            });
        }
        let end = frame.msg.end_theta();
        if end < self.scan_range.end() {
            return self.discard(AssemblyError::Incomplete {
                scan_counter: counter,
                end: end.value(),
                range_end: self.scan_range.end().value(),
            });
        }
        let round = Round {
            scan_counter: counter,
            resolution: frame.msg.resolution(),
            next_theta: end,
            deadline: frame.stamp + self.round_timeout_ns,
            frames: vec![frame],
        };
        self.finish_round(round)
    }

    fn open_round(
        &mut self,
        frame: MonitoringFrameMessageStamped,
    ) -> Result<Option<LaserScan>, AssemblyError> {
        let counter = frame.msg.scan_counter();
        if frame.msg.from_theta() != self.scan_range.start() {
            return self.discard(AssemblyError::UnexpectedStart {
                scan_counter: counter,
                expected: self.scan_range.start().value(),
                actual: frame.msg.from_theta().value(),
            });
        }
        debug!("Opening scan round {}", counter);
        let round = Round {
            scan_counter: counter,
            resolution: frame.msg.resolution(),
            next_theta: frame.msg.end_theta(),
            deadline: frame.stamp + self.round_timeout_ns,
            frames: vec![frame],
        };
        self.advance(round)
    }

    fn extend_round(
        &mut self,
        mut round: Round,
        frame: MonitoringFrameMessageStamped,
    ) -> Result<Option<LaserScan>, AssemblyError> {
        let counter = round.scan_counter;
        if frame.msg.resolution() != round.resolution {
            return self.discard(AssemblyError::ResolutionMismatch {
                scan_counter: counter,
                expected: round.resolution.value(),
                actual: frame.msg.resolution().value(),
            });
        }
        if frame.msg.from_theta() != round.next_theta {
            return self.discard(AssemblyError::NonContiguous {
                scan_counter: counter,
                expected: round.next_theta.value(),
                actual: frame.msg.from_theta().value(),
            });
        }
        round.next_theta = frame.msg.end_theta();
        round.frames.push(frame);
        self.advance(round)
    }

    fn advance(&mut self, round: Round) -> Result<Option<LaserScan>, AssemblyError> {
        if round.next_theta >= self.scan_range.end() {
            return self.finish_round(round);
        }
        trace!(
            "Scan {} covered up to {} of {}",
            round.scan_counter,
            round.next_theta,
            self.scan_range
        );
        self.state = RoundState::Collecting(round);
        Ok(None)
    }

    fn finish_round(&mut self, round: Round) -> Result<Option<LaserScan>, AssemblyError> {
        let overshoot = round.next_theta - self.scan_range.end();
        if overshoot >= round.resolution {
            return self.discard(AssemblyError::ExceedsRange {
                scan_counter: round.scan_counter,
                end: round.next_theta.value(),
                range_end: self.scan_range.end().value(),
            });
        }
        let scan = self.merge(round);
        debug!(
            "Completed scan {}: {} rays, {} to {}",
            scan.scan_counter(),
            scan.measurements().len(),
            scan.min_angle(),
            scan.max_angle()
        );
        self.state = RoundState::Completed(scan.scan_counter());
        Ok(Some(scan))
    }

    fn merge(&self, round: Round) -> LaserScan {
        let first = &round.frames[0];
        let timestamp = compute_first_ray_timestamp(
            first.stamp,
            first.msg.from_theta(),
            first.msg.resolution(),
            first.msg.measurements().len(),
            self.scan_range,
            self.rotation_period,
        );
        let min_angle = first.msg.from_theta();
        let active_zoneset = round
            .frames
            .last()
            .map(|frame| frame.msg.active_zoneset())
            .unwrap_or_default();

        let rays = self.scan_range.ray_count(round.resolution);
        let mut measurements = Vec::with_capacity(rays);
        let mut intensities = Vec::with_capacity(rays);
        let mut diagnostics = Vec::new();
        let mut io_states = Vec::new();
        for frame in round.frames {
            measurements.extend_from_slice(frame.msg.measurements());
            intensities.extend_from_slice(frame.msg.intensities());
            diagnostics.extend_from_slice(frame.msg.diagnostics());
            if let Some(pin_data) = frame.msg.io_pin_data() {
                io_states.push(IOState {
                    pin_data: pin_data.clone(),
                    timestamp: frame.stamp,
                });
            }
        }

        LaserScan::new(
            timestamp,
            round.scan_counter,
            min_angle,
            round.resolution,
            active_zoneset,
            measurements,
            intensities,
            diagnostics,
            io_states,
        )
    }
}

fn round_counter(error: &AssemblyError) -> u32 {
    match *error {
        AssemblyError::UnexpectedStart { scan_counter, .. }
        | AssemblyError::NonContiguous { scan_counter, .. }
        | AssemblyError::ResolutionMismatch { scan_counter, .. }
        | AssemblyError::ExceedsRange { scan_counter, .. }
        | AssemblyError::Incomplete { scan_counter, .. }
        | AssemblyError::TimedOut { scan_counter, .. }
        | AssemblyError::DiscardedRound { scan_counter }
        | AssemblyError::DuplicateRound { scan_counter } => scan_counter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MonitoringFrameMessageBuilder;
    use crate::parsers::io_pins::PinData;
    use crate::test_util::{create_valid_monitoring_frame_msg, seeded_rng};
    use rand::Rng;

    const PERIOD_NS: i64 = 30_000_000;

    fn range(start: i32, end: i32) -> ScanRange {
        ScanRange::new(TenthOfDegree::new(start), TenthOfDegree::new(end)).unwrap()
    }

    fn frame(counter: u32, from: i32, res: i32, rays: usize, stamp: i64) -> MonitoringFrameMessageStamped {
        let msg = MonitoringFrameMessageBuilder::new()
            .scan_counter(counter)
            .from_theta(TenthOfDegree::new(from))
            .resolution(TenthOfDegree::new(res))
            .measurements(vec![1.0; rays])
            .intensities(vec![5.0; rays])
            .build()
            .unwrap();
        MonitoringFrameMessageStamped::new(msg, stamp)
    }

    #[test]
    fn single_frame_covers_whole_range() {
        let mut assembler = ScanRoundAssembler::new(range(1, 600), false);
        let scan = assembler.push(frame(1, 1, 10, 60, 1_000_000_000)).unwrap().unwrap();
        assert_eq!(scan.measurements().len(), 60);
        assert_eq!(scan.intensities().len(), 60);
        assert_eq!(scan.min_angle(), TenthOfDegree::new(1));
        assert_eq!(scan.max_angle(), TenthOfDegree::new(591));
        assert!(scan.timestamp() < 1_000_000_000);
    }

    #[test]
    fn single_frame_mode_rejects_partial_frames() {
        let mut assembler = ScanRoundAssembler::new(range(0, 2750), false);
        assert!(matches!(
            assembler.push(frame(1, 0, 1, 1375, 0)),
            Err(AssemblyError::Incomplete { scan_counter: 1, end: 1375, range_end: 2750 })
        ));
        assert!(assembler.push(frame(2, 0, 1, 2750, 0)).unwrap().is_some());
    }

    #[test]
    fn two_fragments_are_joined_in_order() {
        let mut assembler = ScanRoundAssembler::new(range(0, 2750), true);
        let first = MonitoringFrameMessageBuilder::new()
            .scan_counter(5)
            .from_theta(TenthOfDegree::new(0))
            .resolution(TenthOfDegree::new(1))
            .active_zoneset(1)
            .measurements(vec![1.0; 1375])
            .intensities(vec![1.0; 1375])
            .build()
            .unwrap();
        let second = MonitoringFrameMessageBuilder::new()
            .scan_counter(5)
            .from_theta(TenthOfDegree::new(1375))
            .resolution(TenthOfDegree::new(1))
            .active_zoneset(2)
            .measurements(vec![2.0; 1375])
            .intensities(vec![2.0; 1375])
            .io_pin_data(PinData::all_cleared())
            .build()
            .unwrap();
        let first = MonitoringFrameMessageStamped::new(first, 100);
        let second = MonitoringFrameMessageStamped::new(second, 200);

        assert_eq!(assembler.push(first).unwrap(), None);
        assert_eq!(assembler.current_scan_counter(), Some(5));
        let scan = assembler.push(second).unwrap().unwrap();
        assert_eq!(scan.measurements().len(), 2750);
        assert_eq!(scan.measurements()[1374], 1.0);
        assert_eq!(scan.measurements()[1375], 2.0);
        assert_eq!(scan.active_zoneset(), 2);
        assert_eq!(scan.io_states().len(), 1);
        assert_eq!(scan.current_io_state().map(|io| io.timestamp), Some(200));
        assert_eq!(assembler.current_scan_counter(), None);
    }

    #[test]
    fn reversed_fragments_emit_nothing() {
        let mut assembler = ScanRoundAssembler::new(range(0, 2750), true);
        assert!(matches!(
            assembler.push(frame(5, 1375, 1, 1375, 100)),
            Err(AssemblyError::UnexpectedStart { expected: 0, actual: 1375, .. })
        ));
        assert_eq!(
            assembler.push(frame(5, 0, 1, 1375, 200)),
            Err(AssemblyError::DiscardedRound { scan_counter: 5 })
        );
        assert!(assembler.push(frame(6, 0, 1, 1375, 300)).unwrap().is_none());
    }

    #[test]
    fn gap_discards_round_until_next_counter() {
        let mut assembler = ScanRoundAssembler::new(range(0, 300), true);
        assert!(assembler.push(frame(1, 0, 1, 100, 0)).unwrap().is_none());
        assert!(matches!(
            assembler.push(frame(1, 200, 1, 100, 1)),
            Err(AssemblyError::NonContiguous { expected: 100, actual: 200, .. })
        ));
        assert_eq!(
            assembler.push(frame(1, 100, 1, 100, 2)),
            Err(AssemblyError::DiscardedRound { scan_counter: 1 })
        );
        assert!(assembler.push(frame(2, 0, 1, 300, 3)).unwrap().is_some());
    }

    #[test]
    fn duplicate_frame_discards_round() {
        let mut assembler = ScanRoundAssembler::new(range(0, 300), true);
        assert!(assembler.push(frame(1, 0, 1, 100, 0)).unwrap().is_none());
        assert!(matches!(
            assembler.push(frame(1, 0, 1, 100, 1)),
            Err(AssemblyError::NonContiguous { expected: 100, actual: 0, .. })
        ));
    }

    #[test]
    fn resolution_change_discards_round() {
        let mut assembler = ScanRoundAssembler::new(range(0, 300), true);
        assert!(assembler.push(frame(1, 0, 1, 100, 0)).unwrap().is_none());
        assert!(matches!(
            assembler.push(frame(1, 100, 2, 100, 1)),
            Err(AssemblyError::ResolutionMismatch { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn completed_round_is_not_emitted_twice() {
        let mut assembler = ScanRoundAssembler::new(range(0, 100), false);
        assert!(assembler.push(frame(9, 0, 1, 100, 0)).unwrap().is_some());
        assert_eq!(
            assembler.push(frame(9, 0, 1, 100, 1)),
            Err(AssemblyError::DuplicateRound { scan_counter: 9 })
        );
    }

    #[test]
    fn overshooting_coverage_is_rejected() {
        let mut assembler = ScanRoundAssembler::new(range(0, 100), true);
        assert!(matches!(
            assembler.push(frame(1, 0, 10, 11, 0)),
            Err(AssemblyError::ExceedsRange { end: 110, range_end: 100, .. })
        ));
    }

    #[test]
    fn new_counter_replaces_incomplete_round() {
        let mut assembler = ScanRoundAssembler::new(range(0, 200), true);
        assert!(assembler.push(frame(1, 0, 1, 100, 0)).unwrap().is_none());
        assert!(assembler.push(frame(2, 0, 1, 100, 1)).unwrap().is_none());
        assert_eq!(assembler.current_scan_counter(), Some(2));
        assert!(assembler.push(frame(2, 100, 1, 100, 2)).unwrap().is_some());
    }

    #[test]
    fn stale_round_times_out() {
        let mut assembler = ScanRoundAssembler::new(range(0, 200), true)
            .with_timing(Duration::from_millis(30), Duration::from_millis(60));
        assert!(assembler.push(frame(1, 0, 1, 100, 0)).unwrap().is_none());
        assert_eq!(assembler.check_deadline(60_000_000), Ok(()));
        assert_eq!(
            assembler.check_deadline(60_000_001),
            Err(AssemblyError::TimedOut { scan_counter: 1, timeout_ns: 60_000_000 })
        );
        assert_eq!(
            assembler.push(frame(1, 100, 1, 100, 60_000_002)),
            Err(AssemblyError::DiscardedRound { scan_counter: 1 })
        );
    }

    #[test]
    fn late_fragment_times_out_on_push() {
        let mut assembler = ScanRoundAssembler::new(range(0, 200), true);
        assert!(assembler.push(frame(3, 0, 1, 100, 0)).unwrap().is_none());
        assert!(matches!(
            assembler.push(frame(3, 100, 1, 100, 1_000_000_000)),
            Err(AssemblyError::TimedOut { scan_counter: 3, .. })
        ));
        assert!(assembler.push(frame(4, 0, 1, 100, 1_000_000_001)).unwrap().is_none());
    }

    #[test]
    fn completed_scans_cover_exactly_the_range_span() {
        let mut rng = seeded_rng(11);
        for counter in 0..50u32 {
            let res = [1, 2, 5, 10][rng.gen_range(0..4)];
            let start = rng.gen_range(0..100) * res;
            let rays = rng.gen_range(2..200);
            let scan_range = range(start, start + rays * res);
            let split = rng.gen_range(1..rays);

            let mut assembler = ScanRoundAssembler::new(scan_range, true);
            let res_t = TenthOfDegree::new(res);
            let split_theta = TenthOfDegree::new(start + split * res);
            let first = create_valid_monitoring_frame_msg(&mut rng, counter, scan_range.start(), split_theta, res_t);
            let second = create_valid_monitoring_frame_msg(&mut rng, counter, split_theta, scan_range.end(), res_t);
            assert!(assembler.push(MonitoringFrameMessageStamped::new(first, 0)).unwrap().is_none());
            let scan = assembler
                .push(MonitoringFrameMessageStamped::new(second, 1))
                .unwrap()
                .unwrap();
            assert_eq!(
                scan.measurements().len() as i32 * res,
                scan_range.span().value()
            );
        }
    }

    #[test]
    fn timestamps_increase_across_rounds() {
        let mut rng = seeded_rng(3);
        let scan_range = range(0, 2750);
        let half = TenthOfDegree::new(1375);
        let res = TenthOfDegree::new(1);
        let mut assembler = ScanRoundAssembler::new(scan_range, true);

        let mut previous: Option<(i64, i64)> = None;
        let mut outliers = 0;
        for round in 0..1000i64 {
            let first_ray = 1_000_000_000 + round * PERIOD_NS;
            let first_arrival = first_ray + PERIOD_NS * 1375 / 3600 + rng.gen_range(0..200_000);
            let last_arrival = first_ray + PERIOD_NS * 2750 / 3600 + rng.gen_range(0..200_000);

            let first = create_valid_monitoring_frame_msg(&mut rng, round as u32, scan_range.start(), half, res);
            let second = create_valid_monitoring_frame_msg(&mut rng, round as u32, half, scan_range.end(), res);
            assert!(assembler
                .push(MonitoringFrameMessageStamped::new(first, first_arrival))
                .unwrap()
                .is_none());
            let scan = assembler
                .push(MonitoringFrameMessageStamped::new(second, last_arrival))
                .unwrap()
                .unwrap();
            let callback_time = last_arrival + 1;

            assert!(scan.timestamp() < first_arrival);
            assert!(scan.timestamp() < callback_time);
            if let Some((previous_stamp, previous_arrival)) = previous {
                assert!(scan.timestamp() > previous_stamp);
                if scan.timestamp() <= previous_arrival {
                    outliers += 1;
                }
            }
            previous = Some((scan.timestamp(), last_arrival));
        }
        assert!(outliers < 3, "{} outliers", outliers);
    }
}
