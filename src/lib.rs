//! # PSENscan Driver
//!
//! `psenscan` is a driver for PSENscan safety laser scanners. The scanner
//! streams monitoring frames over UDP; the driver decodes them, stitches the
//! frames of each scan round into one timestamped `LaserScan` and hands it to
//! a callback. Streaming is switched on and off with an acknowledged
//! start/stop handshake on a separate control port.
//!
//! ```no_run
//! # use psenscan::{Scanner, ScannerConfigurationBuilder};
//! # fn main() -> psenscan::Result<()> {
//! let config = ScannerConfigurationBuilder::new()
//!     .scanner_ip("192.168.0.10")
//!     .host_ip("192.168.0.20")
//!     .build()?;
//! let scanner = Scanner::new(config, |scan| {
//!     println!("scan {} with {} rays", scan.scan_counter(), scan.measurements().len());
//! })?;
//! scanner.start()?.wait()?;
//! // ...
//! scanner.stop()?.wait()?;
//! # Ok(())
//! # }
//! ```

extern crate byteorder;
extern crate crc32fast;
extern crate crossbeam_channel;
extern crate log;

mod answers;
mod assembler;
pub mod base;
mod checksum;
mod cmds;
mod config;
mod control;
mod frame;
pub mod internals;
mod node;
mod parsers;
mod protocol;
mod timestamp;
pub mod types;

#[cfg(test)]
mod test_util;

pub use crate::answers::Reply;
pub use crate::assembler::ScanRoundAssembler;
pub use crate::base::{
    AssemblyError, BuilderError, Clock, ConfigurationError, ControlError, Datagram, DatagramSink,
    DatagramSource, DecodeError, Error, Result, SystemClock, UdpChannel,
};
pub use crate::cmds::{Request, StartRequest};
pub use crate::config::{ScannerConfiguration, ScannerConfigurationBuilder};
pub use crate::control::{AckHandle, ControlStateMachine, ScannerState};
pub use crate::frame::{
    MonitoringFrameMessage, MonitoringFrameMessageBuilder, MonitoringFrameMessageStamped,
};
pub use crate::node::{LaserScanner, ScannerNode, TerminationHandle};
pub use crate::parsers::diagnostics::{DiagnosticMessage, ErrorLocation, ScannerId};
pub use crate::parsers::encoder::EncoderData;
pub use crate::parsers::io_pins::PinData;
pub use crate::protocol::{decode_monitoring_frame, encode_monitoring_frame};
pub use crate::timestamp::compute_first_ray_timestamp;
pub use crate::types::{IOState, LaserScan, PinState, ScanRange, TenthOfDegree};

use log::{debug, error, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Datagram endpoints and clock a `Scanner` runs on.
///
/// `Scanner::new` binds UDP sockets; tests and simulations inject their own.
pub struct ScannerTransport {
    /// Monitoring frames from the scanner's data port.
    pub data_source: Box<dyn DatagramSource>,
    /// Replies from the scanner's control port.
    pub control_source: Box<dyn DatagramSource>,
    /// Requests to the scanner's control port.
    pub control_sink: Box<dyn DatagramSink>,
    pub clock: Arc<dyn Clock>,
}

/// Connection to and control interface for a PSENscan device.
///
/// Owns two receive threads: one decodes monitoring frames and feeds the
/// scan round assembler, the other applies control replies to the start/stop
/// state machine. Frames are only assembled while the scanner is running.
/// Dropping the `Scanner` cancels pending requests and joins both threads.
pub struct Scanner {
    control: Arc<Mutex<ControlStateMachine>>,
    terminate: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

fn lock(control: &Mutex<ControlStateMachine>) -> MutexGuard<'_, ControlStateMachine> {
    control.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scanner {
    /// Binds the host data and control ports and starts the receive threads.
    ///
    /// No request is sent; call `start()` to begin streaming.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated scanner configuration.
    /// * `callback` - Invoked on the data receive thread for every completed scan.
    pub fn new<F>(config: ScannerConfiguration, callback: F) -> Result<Scanner>
    where
        F: FnMut(LaserScan) + Send + 'static,
    {
        trace!("Creating new Scanner for {}", config.scanner_ip());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let data = UdpChannel::bind(
            config.host_data_addr(),
            config.scanner_data_addr(),
            config.read_timeout(),
            Arc::clone(&clock),
        )?;
        let control = UdpChannel::bind(
            config.host_control_addr(),
            config.scanner_control_addr(),
            config.read_timeout(),
            Arc::clone(&clock),
        )?;
        let control_sink = control.try_clone()?;
        let transport = ScannerTransport {
            data_source: Box::new(data),
            control_source: Box::new(control),
            control_sink: Box::new(control_sink),
            clock,
        };
        Scanner::with_transport(config, transport, callback)
    }

    /// Starts the receive threads on an existing transport.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated scanner configuration.
    /// * `transport` - Datagram endpoints and clock to run on.
    /// * `callback` - Invoked on the data receive thread for every completed scan.
    pub fn with_transport<F>(
        config: ScannerConfiguration,
        transport: ScannerTransport,
        callback: F,
    ) -> Result<Scanner>
    where
        F: FnMut(LaserScan) + Send + 'static,
    {
        let control = Arc::new(Mutex::new(ControlStateMachine::new(
            transport.control_sink,
            config.start_request(),
            config.ack_timeout(),
        )));
        let terminate = Arc::new(AtomicBool::new(false));

        let data_loop = DataLoop {
            source: transport.data_source,
            assembler: ScanRoundAssembler::from_config(&config),
            clock: transport.clock,
            control: Arc::clone(&control),
            terminate: Arc::clone(&terminate),
            error_backoff: config.read_timeout(),
            callback,
        };
        let control_loop = ControlLoop {
            source: transport.control_source,
            control: Arc::clone(&control),
            terminate: Arc::clone(&terminate),
            error_backoff: config.read_timeout(),
        };

        let mut scanner = Scanner {
            control,
            terminate,
            threads: Vec::with_capacity(2),
        };
        let data_thread = thread::Builder::new()
            .name("psenscan-data".to_owned())
            .spawn(move || data_loop.run())?;
        scanner.threads.push(data_thread);
        let control_thread = thread::Builder::new()
            .name("psenscan-control".to_owned())
            .spawn(move || control_loop.run())?;
        scanner.threads.push(control_thread);
        debug!("Scanner receive threads started");
        Ok(scanner)
    }

    /// Requests the scanner to start streaming monitoring frames.
    pub fn start(&self) -> Result<AckHandle> {
        trace!("Sending start request");
        Ok(lock(&self.control).start()?)
    }

    /// Requests the scanner to stop streaming monitoring frames.
    pub fn stop(&self) -> Result<AckHandle> {
        trace!("Sending stop request");
        Ok(lock(&self.control).stop()?)
    }

    pub fn state(&self) -> ScannerState {
        lock(&self.control).state()
    }

    /// Cancels pending requests and joins the receive threads. Idempotent.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        debug!("Shutting down scanner");
        self.terminate.store(true, Ordering::SeqCst);
        lock(&self.control).shutdown();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("Scanner receive thread panicked");
            }
        }
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LaserScanner for Scanner {
    fn start(&self) -> Result<AckHandle> {
        Scanner::start(self)
    }

    fn stop(&self) -> Result<AckHandle> {
        Scanner::stop(self)
    }
}

struct DataLoop<F> {
    source: Box<dyn DatagramSource>,
    assembler: ScanRoundAssembler,
    clock: Arc<dyn Clock>,
    control: Arc<Mutex<ControlStateMachine>>,
    terminate: Arc<AtomicBool>,
    error_backoff: Duration,
    callback: F,
}

impl<F: FnMut(LaserScan)> DataLoop<F> {
    fn run(mut self) {
        trace!("Data receive loop started");
        while !self.terminate.load(Ordering::SeqCst) {
            match self.source.receive() {
                Ok(Some(datagram)) => self.handle_datagram(datagram),
                Ok(None) => {
                    // the assembler logs the discarded round
                    let _ = self.assembler.check_deadline(self.clock.now_ns());
                }
                Err(e) => {
                    error!("Data channel receive failed: {}", e);
                    thread::sleep(self.error_backoff);
                }
            }
        }
        trace!("Data receive loop terminated");
    }

    fn handle_datagram(&mut self, datagram: Datagram) {
        if !lock(&self.control).is_running() {
            trace!("Dropping {} bytes, scanner not running", datagram.data.len());
            self.assembler.reset();
            return;
        }
        let msg = match decode_monitoring_frame(&datagram.data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping malformed monitoring frame: {}", e);
                return;
            }
        };
        match self
            .assembler
            .push(MonitoringFrameMessageStamped::new(msg, datagram.stamp))
        {
            Ok(Some(scan)) => (self.callback)(scan),
            // rejected frames are logged by the assembler
            Ok(None) | Err(_) => {}
        }
    }
}

struct ControlLoop {
    source: Box<dyn DatagramSource>,
    control: Arc<Mutex<ControlStateMachine>>,
    terminate: Arc<AtomicBool>,
    error_backoff: Duration,
}

impl ControlLoop {
    fn run(mut self) {
        trace!("Control receive loop started");
        while !self.terminate.load(Ordering::SeqCst) {
            match self.source.receive() {
                Ok(Some(datagram)) => lock(&self.control).handle_datagram(&datagram.data),
                Ok(None) => lock(&self.control).check_timeout(Instant::now()),
                Err(e) => {
                    error!("Control channel receive failed: {}", e);
                    thread::sleep(self.error_backoff);
                }
            }
        }
        trace!("Control receive loop terminated");
    }
}
