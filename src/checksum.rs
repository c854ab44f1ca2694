use crc32fast::Hasher;

/// Calculates the CRC-32 (IEEE) checksum that leads every control message.
#[derive(Default)]
pub struct Checksum {
    hasher: Hasher,
}

impl Checksum {
    /// Creates a new `Checksum` over no data.
    #[inline]
    pub fn new() -> Checksum {
        Checksum {
            hasher: Hasher::new(),
        }
    }

    /// Includes a slice of bytes in the checksum calculation.
    ///
    /// # Arguments
    ///
    /// * `data` - The bytes following the checksum field, in wire order.
    #[inline]
    pub fn push_slice(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Returns the checksum of all bytes pushed so far.
    #[inline]
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// Checksum of a single contiguous buffer.
pub fn checksum_of(data: &[u8]) -> u32 {
    let mut checksum = Checksum::new();
    checksum.push_slice(data);
    checksum.checksum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_crc32_check_value() {
        assert_eq!(checksum_of(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn incremental_and_single_shot_agree() {
        let mut checksum = Checksum::new();
        checksum.push_slice(b"1234");
        checksum.push_slice(b"56789");
        assert_eq!(checksum.checksum(), checksum_of(b"123456789"));
        assert_eq!(Checksum::new().checksum(), 0);
    }
}
