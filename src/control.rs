use crate::answers::Reply;
use crate::base::{ControlError, DatagramSink};
use crate::cmds::{Request, StartRequest};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, trace, warn};
use std::fmt;
use std::time::{Duration, Instant};

/// Streaming state of the scanner as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ScannerState {
    pub fn name(&self) -> &'static str {
        match self {
            ScannerState::Idle => "idle",
            ScannerState::Starting => "starting",
            ScannerState::Running => "running",
            ScannerState::Stopping => "stopping",
            ScannerState::Failed => "failed",
        }
    }
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type AckResult = Result<(), ControlError>;

/// Awaitable outcome of one start or stop request.
///
/// Resolves exactly once: acknowledged, refused, timed out or cancelled.
#[derive(Debug)]
pub struct AckHandle {
    request: &'static str,
    rx: Receiver<AckResult>,
    deadline: Instant,
    resolved: Option<AckResult>,
}

impl AckHandle {
    /// A handle that is already resolved, e.g. for scanners without a handshake.
    pub fn ready(request: &'static str, result: AckResult) -> AckHandle {
        let (_, rx) = bounded(0);
        AckHandle {
            request,
            rx,
            deadline: Instant::now(),
            resolved: Some(result),
        }
    }

    /// Instant after which the request counts as timed out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Blocks until the request is resolved or its deadline passes.
    pub fn wait(mut self) -> AckResult {
        if let Some(result) = self.resolved.take() {
            return result;
        }
        match self.rx.recv_deadline(self.deadline) {
            Ok(result) => result,
            // a reply may have been accepted right at the deadline
            Err(RecvTimeoutError::Timeout) => match self.rx.try_recv() {
                Ok(result) => result,
                Err(_) => Err(ControlError::Timeout(self.request)),
            },
            Err(RecvTimeoutError::Disconnected) => Err(ControlError::Cancelled(self.request)),
        }
    }

    /// Returns the outcome if the request is resolved, `None` while pending.
    pub fn try_wait(&mut self) -> Option<AckResult> {
        if self.resolved.is_none() {
            self.resolved = match self.rx.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) if Instant::now() >= self.deadline => {
                    Some(Err(ControlError::Timeout(self.request)))
                }
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err(ControlError::Cancelled(self.request))),
            };
        }
        self.resolved.clone()
    }
}

#[derive(Debug)]
struct PendingRequest {
    request: Request,
    /// State to fall back to if the request times out.
    fallback: ScannerState,
    deadline: Instant,
    tx: Sender<AckResult>,
}

impl PendingRequest {
    fn resolve(&self, result: AckResult) {
        if self.tx.send(result).is_err() {
            trace!("Handle of {} request already dropped", self.request.name());
        }
    }
}

/// Sequences the start/stop handshake with the scanner.
///
/// At most one request is outstanding. Timeouts are reported through the
/// returned `AckHandle`; retrying is up to the caller.
pub struct ControlStateMachine {
    sink: Box<dyn DatagramSink>,
    start_request: StartRequest,
    ack_timeout: Duration,
    state: ScannerState,
    pending: Option<PendingRequest>,
    sequence: u32,
}

impl ControlStateMachine {
    /// Creates a state machine in `Idle`.
    ///
    /// # Arguments
    ///
    /// * `sink` - Where requests are sent, normally the scanner's control port.
    /// * `start_request` - Parameters sent with every start request.
    /// * `ack_timeout` - How long each request waits for its reply.
    pub fn new(
        sink: Box<dyn DatagramSink>,
        start_request: StartRequest,
        ack_timeout: Duration,
    ) -> ControlStateMachine {
        ControlStateMachine {
            sink,
            start_request,
            ack_timeout,
            state: ScannerState::Idle,
            pending: None,
            sequence: 0,
        }
    }

    /// Current state, taking an expired request into account.
    pub fn state(&self) -> ScannerState {
        match &self.pending {
            Some(pending) if Instant::now() >= pending.deadline => pending.fallback,
            _ => self.state,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ScannerState::Running
    }

    /// Sends a start request. Allowed from `Idle` and `Failed`.
    pub fn start(&mut self) -> Result<AckHandle, ControlError> {
        self.check_timeout(Instant::now());
        self.ensure_not_busy()?;
        match self.state {
            ScannerState::Idle | ScannerState::Failed => {}
            state => {
                return Err(ControlError::InvalidTransition {
                    request: "start",
                    state: state.name(),
                })
            }
        }
        self.send_request(Request::Start(self.start_request), ScannerState::Starting, ScannerState::Idle)
    }

    /// Sends a stop request. Allowed from `Idle`, `Running` and `Failed`.
    pub fn stop(&mut self) -> Result<AckHandle, ControlError> {
        self.check_timeout(Instant::now());
        self.ensure_not_busy()?;
        let fallback = match self.state {
            ScannerState::Running => ScannerState::Running,
            ScannerState::Idle | ScannerState::Failed => ScannerState::Idle,
            state => {
                return Err(ControlError::InvalidTransition {
                    request: "stop",
                    state: state.name(),
                })
            }
        };
        self.send_request(Request::Stop, ScannerState::Stopping, fallback)
    }

    fn ensure_not_busy(&self) -> Result<(), ControlError> {
        match &self.pending {
            Some(pending) => Err(ControlError::Busy(pending.request.name())),
            None => Ok(()),
        }
    }

    fn send_request(
        &mut self,
        request: Request,
        next: ScannerState,
        fallback: ScannerState,
    ) -> Result<AckHandle, ControlError> {
        self.sequence = self.sequence.wrapping_add(1);
        let bytes = request.encode(self.sequence);
        if let Err(e) = self.sink.send(&bytes) {
            error!("Failed to send {} request: {}", request.name(), e);
            self.transition(ScannerState::Failed);
            return Err(ControlError::Transport(e.to_string()));
        }

        let (tx, rx) = bounded(1);
        let deadline = Instant::now() + self.ack_timeout;
        self.pending = Some(PendingRequest {
            request,
            fallback,
            deadline,
            tx,
        });
        self.transition(next);
        Ok(AckHandle {
            request: request.name(),
            rx,
            deadline,
            resolved: None,
        })
    }

    fn transition(&mut self, next: ScannerState) {
        if self.state != next {
            debug!("Scanner state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Expires the pending request if its deadline has passed.
    ///
    /// Called on every request and reply and periodically by the control
    /// receive path.
    pub fn check_timeout(&mut self, now: Instant) {
        let expired = matches!(&self.pending, Some(pending) if now >= pending.deadline);
        if !expired {
            return;
        }
        if let Some(pending) = self.pending.take() {
            warn!(
                "{} request not acknowledged within {:?}",
                pending.request.name(),
                self.ack_timeout
            );
            pending.resolve(Err(ControlError::Timeout(pending.request.name())));
            self.transition(pending.fallback);
        }
    }

    /// Applies a decoded reply to the pending request.
    pub fn handle_reply(&mut self, reply: &Reply) {
        self.check_timeout(Instant::now());
        let Some(pending) = self.pending.take() else {
            warn!("Ignoring late or unsolicited reply to opcode {:#X}", reply.opcode);
            return;
        };
        if reply.opcode != pending.request.opcode() {
            warn!(
                "Ignoring reply to opcode {:#X} while {} request is pending",
                reply.opcode,
                pending.request.name()
            );
            self.pending = Some(pending);
            return;
        }

        let name = pending.request.name();
        if reply.is_accepted() {
            let next = match pending.request {
                Request::Start(_) => ScannerState::Running,
                Request::Stop => ScannerState::Idle,
            };
            debug!("{} request acknowledged", name);
            self.transition(next);
            pending.resolve(Ok(()));
        } else {
            error!("{} request refused with code {:#010X}", name, reply.result);
            self.transition(ScannerState::Failed);
            pending.resolve(Err(ControlError::Refused {
                request: name,
                code: reply.result,
            }));
        }
    }

    /// Decodes a datagram from the control port and applies it.
    pub fn handle_datagram(&mut self, data: &[u8]) {
        match Reply::decode(data) {
            Ok(reply) => self.handle_reply(&reply),
            Err(e) => warn!("Dropping malformed control reply: {}", e),
        }
    }

    /// Resolves a pending request with `Cancelled`.
    pub fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("Cancelling pending {} request", pending.request.name());
            pending.resolve(Err(ControlError::Cancelled(pending.request.name())));
            self.transition(pending.fallback);
        }
    }
}

impl fmt::Debug for ControlStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlStateMachine")
            .field("state", &self.state)
            .field("pending", &self.pending)
            .field("sequence", &self.sequence)
            .finish()
    }
}
