use crate::base::error::Result;
use crate::base::message::Datagram;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of stamped datagrams, e.g. a bound UDP socket.
pub trait DatagramSource: Send {
    /// Waits for the next datagram.
    ///
    /// Returns `Ok(None)` when nothing arrived within the source's read
    /// timeout, so callers can check for termination between reads.
    fn receive(&mut self) -> Result<Option<Datagram>>;
}

/// A destination for outgoing control requests.
pub trait DatagramSink: Send {
    /// Sends one datagram, returning the number of bytes written.
    fn send(&mut self, data: &[u8]) -> Result<usize>;
}

/// Wall-clock source used to stamp datagrams and check round deadlines.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since the UNIX epoch.
    fn now_ns(&self) -> i64;
}

/// `Clock` backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_nanos() as i64,
            Err(before_epoch) => -(before_epoch.duration().as_nanos() as i64),
        }
    }
}
