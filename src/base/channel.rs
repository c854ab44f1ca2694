use crate::base::error::Result;
use crate::base::message::Datagram;
use crate::base::traits::{Clock, DatagramSink, DatagramSource};
use log::{error, trace, warn};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

/// Largest UDP payload, so a datagram is never cut by the read buffer.
const DEFAULT_CHANNEL_READ_BUFFER_SIZE: usize = 65535;

/// UDP channel to one scanner port, stamping every datagram on arrival.
///
/// Datagrams from any other peer address are dropped.
///
/// # Examples
/// ```ignore
/// let mut channel = UdpChannel::bind(
///     "0.0.0.0:55115".parse()?,
///     "192.168.0.10:2000".parse()?,
///     Duration::from_millis(100),
///     Arc::new(SystemClock),
/// )?;
///
/// if let Some(datagram) = channel.receive()? {
///     println!("{} bytes at {}", datagram.data.len(), datagram.stamp);
/// }
/// ```
pub struct UdpChannel {
    socket: UdpSocket,
    peer: SocketAddr,
    clock: Arc<dyn Clock>,
    read_buffer: Vec<u8>,
}

impl UdpChannel {
    /// Binds a local socket and associates it with the scanner's address.
    ///
    /// # Arguments
    ///
    /// * `local` - Host address and port to bind.
    /// * `peer` - Scanner address and port datagrams are exchanged with.
    /// * `read_timeout` - How long `receive` blocks before returning `Ok(None)`.
    /// * `clock` - Clock used to stamp incoming datagrams.
    pub fn bind(
        local: SocketAddr,
        peer: SocketAddr,
        read_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<UdpChannel> {
        trace!("Binding UDP channel {} <-> {}", local, peer);
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(read_timeout))?;
        Ok(UdpChannel {
            socket,
            peer,
            clock,
            read_buffer: vec![0; DEFAULT_CHANNEL_READ_BUFFER_SIZE],
        })
    }

    /// Creates an independent handle to the same socket, e.g. to send on one
    /// thread while another receives.
    pub fn try_clone(&self) -> Result<UdpChannel> {
        Ok(UdpChannel {
            socket: self.socket.try_clone()?,
            peer: self.peer,
            clock: Arc::clone(&self.clock),
            read_buffer: vec![0; DEFAULT_CHANNEL_READ_BUFFER_SIZE],
        })
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl DatagramSource for UdpChannel {
    fn receive(&mut self) -> Result<Option<Datagram>> {
        match self.socket.recv_from(&mut self.read_buffer) {
            Ok((len, from)) => {
                let stamp = self.clock.now_ns();
                if from.ip() != self.peer.ip() {
                    warn!("Dropping {} bytes from unexpected peer {}", len, from);
                    return Ok(None);
                }
                trace!("Received {} bytes from {} at {}", len, from, stamp);
                Ok(Some(Datagram::with_data(&self.read_buffer[..len], stamp)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                trace!("Socket read timed out");
                Ok(None)
            }
            Err(e) => {
                error!("IO error reading from socket: {}", e);
                Err(e.into())
            }
        }
    }
}

impl DatagramSink for UdpChannel {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        trace!("Sending {} bytes to {}", data.len(), self.peer);
        match self.socket.send_to(data, self.peer) {
            Ok(written) => Ok(written),
            Err(e) => {
                error!("IO error sending to {}: {}", self.peer, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::SystemClock;

    fn loopback_pair() -> (UdpChannel, UdpChannel) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let timeout = Duration::from_millis(200);
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut a = UdpChannel::bind(any, any, timeout, Arc::clone(&clock)).unwrap();
        let mut b = UdpChannel::bind(any, any, timeout, clock).unwrap();
        a.peer = b.local_addr().unwrap();
        b.peer = a.local_addr().unwrap();
        (a, b)
    }

    #[test]
    fn loopback_send_and_receive() {
        let (mut a, mut b) = loopback_pair();
        assert_eq!(a.send(&[1, 2, 3]).unwrap(), 3);
        let datagram = b.receive().unwrap().unwrap();
        assert_eq!(datagram.data, vec![1, 2, 3]);
        assert!(datagram.stamp > 0);
    }

    #[test]
    fn receive_times_out_with_none() {
        let (_a, mut b) = loopback_pair();
        assert!(b.receive().unwrap().is_none());
    }
}
