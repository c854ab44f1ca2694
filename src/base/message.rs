/// One UDP payload as received from the scanner, stamped on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    /// Raw payload bytes, untrusted.
    pub data: Vec<u8>,

    /// Arrival time in nanoseconds since the UNIX epoch.
    pub stamp: i64,
}

impl Datagram {
    /// Creates a new datagram from a payload slice and its arrival time.
    ///
    /// # Arguments
    ///
    /// * `data` - A slice containing the payload.
    /// * `stamp` - Arrival time in nanoseconds.
    #[inline]
    pub fn with_data(data: &[u8], stamp: i64) -> Datagram {
        Datagram {
            data: data.to_vec(),
            stamp,
        }
    }
}
