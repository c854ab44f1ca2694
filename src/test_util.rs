//! Fakes and synthetic data shared by the unit tests.

use crate::base::{Clock, Datagram, DatagramSink, DatagramSource, Result};
use crate::cmds::StartRequest;
use crate::frame::{MonitoringFrameMessage, MonitoringFrameMessageBuilder};
use crate::parsers::diagnostics::{DiagnosticMessage, ErrorLocation, ScannerId, DIAGNOSTIC_BYTES_PER_DEVICE};
use crate::parsers::encoder::EncoderData;
use crate::parsers::io_pins::PinData;
use crate::types::{ScanRange, TenthOfDegree};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn default_scan_range() -> ScanRange {
    ScanRange::new(TenthOfDegree::new(0), TenthOfDegree::new(2750)).unwrap()
}

pub fn default_start_request() -> StartRequest {
    StartRequest {
        host_ip: Ipv4Addr::new(192, 168, 0, 50),
        host_data_port: 55115,
        diagnostics_enabled: true,
        fragmented_scan: false,
        scan_range: default_scan_range(),
        resolution: TenthOfDegree::new(1),
    }
}

fn random_pin_data(rng: &mut StdRng) -> PinData {
    let mut pin_data = PinData::all_cleared();
    for bank in [
        &mut pin_data.physical_input_0,
        &mut pin_data.physical_input_1,
        &mut pin_data.physical_input_2,
        &mut pin_data.logical_input,
        &mut pin_data.output,
    ] {
        for pin in bank.iter_mut() {
            pin.value = rng.gen_bool(0.3);
        }
    }
    pin_data
}

/// Builds a random but valid frame covering `[from_theta, to_theta)`.
///
/// Measurements have one decimal so they survive the millimetre encoding.
pub fn create_valid_monitoring_frame_msg(
    rng: &mut StdRng,
    scan_counter: u32,
    from_theta: TenthOfDegree,
    to_theta: TenthOfDegree,
    resolution: TenthOfDegree,
) -> MonitoringFrameMessage {
    let span = (to_theta - from_theta).value();
    let rays = ((span + resolution.value() - 1) / resolution.value()) as usize;
    let measurements = (0..rays)
        .map(|_| (rng.gen_range(0.0..60.0f64) * 10.0).round() / 10.0)
        .collect();
    let intensities = (0..rays)
        .map(|_| f64::from(rng.gen_range(0..=16383u16)))
        .collect();
    let diagnostics = (0..rng.gen_range(0..4))
        .map(|_| {
            DiagnosticMessage::new(
                ScannerId::ALL[rng.gen_range(0..ScannerId::ALL.len())],
                ErrorLocation::new(rng.gen_range(0..DIAGNOSTIC_BYTES_PER_DEVICE), rng.gen_range(0..8)),
            )
        })
        .collect();

    let mut builder = MonitoringFrameMessageBuilder::new()
        .scan_counter(scan_counter)
        .from_theta(from_theta)
        .resolution(resolution)
        .active_zoneset(rng.gen_range(0..8))
        .measurements(measurements)
        .intensities(intensities)
        .diagnostic_messages(diagnostics)
        .io_pin_data(random_pin_data(rng));
    if rng.gen_bool(0.5) {
        builder = builder.encoder_data(EncoderData {
            encoder_1: rng.gen_range(-100.0..100.0),
            encoder_2: rng.gen_range(-100.0..100.0),
        });
    }
    builder.build().unwrap()
}

/// `DatagramSource` fed through a channel.
pub struct ChannelSource {
    rx: Receiver<Datagram>,
    read_timeout: Duration,
}

impl ChannelSource {
    pub fn new(read_timeout: Duration) -> (ChannelSource, Sender<Datagram>) {
        let (tx, rx) = unbounded();
        (ChannelSource { rx, read_timeout }, tx)
    }
}

impl DatagramSource for ChannelSource {
    fn receive(&mut self) -> Result<Option<Datagram>> {
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(datagram) => Ok(Some(datagram)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(self.read_timeout);
                Ok(None)
            }
        }
    }
}

/// `DatagramSink` that forwards every datagram to a channel.
pub struct ChannelSink {
    tx: Sender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new() -> (ChannelSink, Receiver<Vec<u8>>) {
        let (tx, rx) = unbounded();
        (ChannelSink { tx }, rx)
    }
}

impl DatagramSink for ChannelSink {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        // the test may have stopped listening
        let _ = self.tx.send(data.to_vec());
        Ok(data.len())
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> ManualClock {
        ManualClock {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn advance(&self, ns: i64) {
        self.now.fetch_add(ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
