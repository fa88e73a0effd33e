//! Microphone input as an entropy source.
//!
//! Audio capture is asynchronous: the device backend is driven from a
//! dedicated capture thread which appends 16-bit PCM samples into a
//! shared buffer and updates the bit statistics as they arrive.
//! `stop_flow` joins that thread, so once it returns no in-flight read
//! can still be touching the buffer.

use super::{BitStats, DeviceError, RandomSource};
use crate::convert::push_i16_le;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Abstraction over an audio capture backend.
///
/// Implementations deliver interleaved signed 16-bit PCM samples. The
/// source drives the device from its own capture thread, so a backend
/// only needs a blocking `read`.
pub trait AudioDevice: Send {
    /// Opens the device for capture.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Reads the next chunk of samples, blocking until data arrives.
    fn read(&mut self) -> Result<Vec<i16>, DeviceError>;

    /// Stops capture and releases the device.
    fn close(&mut self);
}

/// Synthetic audio device producing deterministic pseudo-noise.
///
/// NOT a source of entropy - only for exercising the capture path in
/// tests and on machines without a microphone. Reads are paced to
/// emulate a device callback rate.
#[derive(Debug)]
pub struct SyntheticAudioDevice {
    state: u32,
    chunk_len: usize,
    pace: Duration,
}

impl SyntheticAudioDevice {
    /// Creates a device with the default internal seed.
    pub fn new() -> Self {
        Self::with_seed(0x6d69_6331)
    }

    /// Creates a device with a caller-chosen seed (zero is bumped to
    /// one; xorshift has a fixed point at zero).
    pub fn with_seed(seed: u32) -> Self {
        Self {
            state: seed.max(1),
            chunk_len: 256,
            pace: Duration::from_millis(2),
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

impl Default for SyntheticAudioDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for SyntheticAudioDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<i16>, DeviceError> {
        thread::sleep(self.pace);
        Ok((0..self.chunk_len).map(|_| self.next_sample()).collect())
    }

    fn close(&mut self) {}
}

/// Samples and statistics shared with the capture thread.
struct CaptureBuffer {
    samples: Vec<i16>,
    stats: BitStats,
}

fn lock(buffer: &Mutex<CaptureBuffer>) -> MutexGuard<'_, CaptureBuffer> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entropy source capturing 16-bit PCM frames from a microphone.
///
/// `init_flow` starts an asynchronous capture; `stop_flow` must return
/// before the accumulated samples or their statistics are accessible.
pub struct MicrophoneEntropySource {
    shared: Arc<Mutex<CaptureBuffer>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MicrophoneEntropySource {
    /// Creates an idle source.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(CaptureBuffer {
                samples: Vec::new(),
                stats: BitStats::new(16),
            })),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Starts capturing from `device` on a background thread.
    ///
    /// A source that is already capturing keeps its running stream and
    /// returns success.
    pub fn init_flow(&mut self, mut device: Box<dyn AudioDevice>) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Ok(());
        }

        device.open()?;
        self.stop.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let stop = Arc::clone(&self.stop);
        let worker = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    match device.read() {
                        Ok(samples) => {
                            let mut buffer = lock(&shared);
                            for &sample in &samples {
                                buffer.stats.record(sample as u16 as usize);
                            }
                            buffer.samples.extend_from_slice(&samples);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "audio read failed, capture stopping");
                            break;
                        }
                    }
                }
                device.close();
            })
            .map_err(|e| DeviceError::AudioUnavailable(e.to_string()))?;

        self.worker = Some(worker);
        tracing::info!("microphone capture started");
        Ok(())
    }

    /// Stops the capture and waits for the capture thread to finish.
    ///
    /// Returns true once the thread has been joined; the buffer and
    /// statistics are then safe to drain.
    pub fn stop_flow(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };

        self.stop.store(true, Ordering::Release);
        let joined = worker.join().is_ok();
        if !joined {
            tracing::warn!("microphone capture thread panicked");
        }
        tracing::info!("microphone capture stopped");
        joined
    }

    /// Returns true while a capture thread is running.
    #[inline]
    pub fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    /// Number of samples accumulated so far (0 while capturing).
    pub fn sample_count(&self) -> usize {
        if self.worker.is_some() {
            return 0;
        }
        lock(&self.shared).samples.len()
    }
}

impl Default for MicrophoneEntropySource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for MicrophoneEntropySource {
    fn append_data(&mut self, dst: &mut Vec<u8>) {
        if self.worker.is_some() {
            tracing::warn!("capture still running, no samples drained");
            return;
        }

        let mut buffer = lock(&self.shared);
        let samples = std::mem::take(&mut buffer.samples);
        push_i16_le(dst, &samples);
        buffer.stats.reset();
    }

    fn bit_entropy(&self) -> Vec<f64> {
        if self.worker.is_some() {
            return vec![0.0; 16];
        }

        let buffer = lock(&self.shared);
        buffer.stats.probabilities(buffer.samples.len())
    }
}

impl Drop for MicrophoneEntropySource {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop_flow();
        }
    }
}
