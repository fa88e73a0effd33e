//! Operating-system randomness as an entropy source.
//!
//! Wraps the platform CSPRNG. The bytes are already high quality; the
//! source still maintains bit statistics so it goes through the same
//! quality gate as the physical providers.

use super::{BitStats, DeviceError, RandomSource};
use rand_core::{OsRng, RngCore};

/// Entropy source backed by the operating system CSPRNG.
pub struct OsEntropySource {
    data: Vec<u8>,
    stats: BitStats,
}

impl OsEntropySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            stats: BitStats::new(8),
        }
    }

    /// Pulls `count` bytes from the OS generator, accumulating them
    /// and updating the bit statistics.
    pub fn generate_random_bytes(&mut self, count: usize) -> Result<(), DeviceError> {
        let mut chunk = vec![0u8; count];
        OsRng
            .try_fill_bytes(&mut chunk)
            .map_err(|e| DeviceError::OsRngUnavailable(e.to_string()))?;

        for &byte in &chunk {
            self.stats.record(byte as usize);
        }
        self.data.extend_from_slice(&chunk);

        tracing::debug!(bytes = count, total = self.data.len(), "OS entropy collected");
        Ok(())
    }

    /// Number of bytes currently buffered.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no bytes are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for OsEntropySource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for OsEntropySource {
    fn append_data(&mut self, dst: &mut Vec<u8>) {
        dst.append(&mut self.data);
        self.stats.reset();
    }

    fn bit_entropy(&self) -> Vec<f64> {
        self.stats.probabilities(self.data.len())
    }
}
