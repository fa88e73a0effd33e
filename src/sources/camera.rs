//! Camera frames as an entropy source.
//!
//! Frames are captured synchronously as signed 16-bit samples (sensor
//! noise lives in the low bits of high-depth readouts). Each captured
//! frame is a burst of consecutive shots so shot-to-shot sensor noise
//! contributes alongside spatial noise.

use super::{BitStats, DeviceError, RandomSource};
use crate::convert::push_i16_le;

/// Shots grabbed per captured frame.
const SHOTS_PER_FRAME: usize = 4;

/// Abstraction over a frame-capture backend.
///
/// Implementations deliver one frame per `grab` call as signed 16-bit
/// samples, channel-interleaved in whatever order the sensor produces.
pub trait CameraDevice {
    /// Opens the device for capture.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Grabs a single frame.
    fn grab(&mut self) -> Result<Vec<i16>, DeviceError>;

    /// Releases the device.
    fn close(&mut self);
}

/// Synthetic camera producing deterministic frame patterns.
///
/// NOT a source of entropy - only for exercising frame handling in
/// tests and on machines without a camera.
#[derive(Debug)]
pub struct SyntheticCameraDevice {
    state: u32,
    samples_per_frame: usize,
    open: bool,
}

impl SyntheticCameraDevice {
    /// Creates a device emitting small frames with the default seed.
    pub fn new() -> Self {
        Self::with_seed(0x6361_6d31)
    }

    /// Creates a device with a caller-chosen seed (zero is bumped to
    /// one; xorshift has a fixed point at zero).
    pub fn with_seed(seed: u32) -> Self {
        Self {
            state: seed.max(1),
            samples_per_frame: 4096,
            open: false,
        }
    }

    fn next_sample(&mut self) -> i16 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x as i16
    }
}

impl Default for SyntheticCameraDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for SyntheticCameraDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        self.open = true;
        Ok(())
    }

    fn grab(&mut self) -> Result<Vec<i16>, DeviceError> {
        if !self.open {
            return Err(DeviceError::CameraUnavailable("device not open".into()));
        }
        Ok((0..self.samples_per_frame).map(|_| self.next_sample()).collect())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Entropy source capturing image frames as 16-bit samples.
pub struct CameraEntropySource {
    data: Vec<u8>,
    stats: BitStats,
}

impl CameraEntropySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            stats: BitStats::new(16),
        }
    }

    /// Captures `frames` frames from `device`, each a burst of
    /// consecutive shots, recording statistics per 16-bit sample and
    /// buffering the sample bytes.
    pub fn capture_frames(
        &mut self,
        device: &mut dyn CameraDevice,
        frames: usize,
    ) -> Result<(), DeviceError> {
        device.open()?;

        for _ in 0..frames {
            for _ in 0..SHOTS_PER_FRAME {
                let samples = match device.grab() {
                    Ok(samples) => samples,
                    Err(e) => {
                        device.close();
                        return Err(e);
                    }
                };

                for &sample in &samples {
                    self.stats.record(sample as u16 as usize);
                }
                push_i16_le(&mut self.data, &samples);
            }
        }

        device.close();
        tracing::debug!(frames, bytes = self.data.len(), "camera frames captured");
        Ok(())
    }

    /// Number of bytes currently buffered.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no samples are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for CameraEntropySource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for CameraEntropySource {
    fn append_data(&mut self, dst: &mut Vec<u8>) {
        dst.append(&mut self.data);
        self.stats.reset();
    }

    fn bit_entropy(&self) -> Vec<f64> {
        // Samples are 16-bit; the buffer holds their bytes.
        self.stats.probabilities(self.data.len() / 2)
    }
}
