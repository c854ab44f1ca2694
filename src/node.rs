use crate::base::{ControlError, Error, Result};
use crate::control::AckHandle;
use crate::internals::PSENSCAN_DEFAULT_START_RETRIES;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};

/// A laser scanner that can be started and stopped. Completed scans are
/// delivered through the callback registered when the scanner was created.
pub trait LaserScanner: Send {
    fn start(&self) -> Result<AckHandle>;
    fn stop(&self) -> Result<AckHandle>;
}

/// Ends `ScannerNode::run` from another thread.
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    tx: Sender<()>,
}

impl TerminationHandle {
    pub fn terminate(&self) {
        // the node may already have returned
        let _ = self.tx.try_send(());
    }
}

/// Runs a scanner for the lifetime of the hosting process: start with a
/// bounded number of attempts, wait for termination, stop.
pub struct ScannerNode {
    scanner: Box<dyn LaserScanner>,
    start_retries: usize,
    terminate_rx: Receiver<()>,
}

impl ScannerNode {
    /// Creates a node and the handle that terminates it.
    ///
    /// # Arguments
    ///
    /// * `scanner` - The scanner to drive, e.g. a `Scanner` or a test fake.
    pub fn new(scanner: Box<dyn LaserScanner>) -> (ScannerNode, TerminationHandle) {
        let (tx, terminate_rx) = bounded(1);
        let node = ScannerNode {
            scanner,
            start_retries: PSENSCAN_DEFAULT_START_RETRIES,
            terminate_rx,
        };
        (node, TerminationHandle { tx })
    }

    /// Number of start attempts before `run` gives up.
    pub fn with_start_retries(mut self, retries: usize) -> Self {
        self.start_retries = retries.max(1);
        self
    }

    /// Starts the scanner, blocks until terminated, then stops the scanner.
    pub fn run(&self) -> Result<()> {
        self.start_with_retries()?;
        info!("Scanner running, waiting for termination");

        // a dropped handle terminates as well
        let _ = self.terminate_rx.recv();

        info!("Terminating, stopping scanner");
        self.scanner.stop()?.wait()?;
        Ok(())
    }

    fn start_with_retries(&self) -> Result<()> {
        for attempt in 1..=self.start_retries {
            debug!("Start attempt {}/{}", attempt, self.start_retries);
            match self.scanner.start().and_then(|handle| handle.wait().map_err(Error::from)) {
                Ok(()) => return Ok(()),
                Err(Error::Control(ControlError::Timeout(request))) => {
                    warn!(
                        "{} attempt {}/{} not acknowledged",
                        request, attempt, self.start_retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(ControlError::Timeout("start").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct Calls {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    /// Times out the first `failing_starts` start requests.
    struct FakeScanner {
        calls: Arc<Calls>,
        failing_starts: usize,
    }

    impl LaserScanner for FakeScanner {
        fn start(&self) -> Result<AckHandle> {
            let attempt = self.calls.starts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failing_starts {
                Ok(AckHandle::ready("start", Err(ControlError::Timeout("start"))))
            } else {
                Ok(AckHandle::ready("start", Ok(())))
            }
        }

        fn stop(&self) -> Result<AckHandle> {
            self.calls.stops.fetch_add(1, Ordering::SeqCst);
            Ok(AckHandle::ready("stop", Ok(())))
        }
    }

    fn node(failing_starts: usize) -> (ScannerNode, TerminationHandle, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let scanner = FakeScanner {
            calls: Arc::clone(&calls),
            failing_starts,
        };
        let (node, handle) = ScannerNode::new(Box::new(scanner));
        (node, handle, calls)
    }

    #[test]
    fn runs_until_terminated_then_stops() {
        let (node, handle, calls) = node(0);
        let runner = thread::spawn(move || node.run());
        handle.terminate();
        assert!(runner.join().unwrap().is_ok());
        assert_eq!(calls.starts.load(Ordering::SeqCst), 1);
        assert_eq!(calls.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retries_start_until_acknowledged() {
        let (node, handle, calls) = node(2);
        handle.terminate();
        assert!(node.run().is_ok());
        assert_eq!(calls.starts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn gives_up_after_retry_budget() {
        let (node, _handle, calls) = node(5);
        let node = node.with_start_retries(3);
        assert!(matches!(
            node.run(),
            Err(Error::Control(ControlError::Timeout("start")))
        ));
        assert_eq!(calls.starts.load(Ordering::SeqCst), 3);
        assert_eq!(calls.stops.load(Ordering::SeqCst), 0);
    }
}
