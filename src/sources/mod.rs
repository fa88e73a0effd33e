//! Entropy sources and the contract they implement.
//!
//! A source accumulates raw sample bytes from some physical or system
//! provider and keeps running bit-occurrence statistics alongside. The
//! seed mixer consumes sources only through the [`RandomSource`]
//! contract: estimate quality first, then drain.
//!
//! Device drivers are deliberately behind narrow traits
//! ([`AudioDevice`], [`CameraDevice`]) so real hardware backends and
//! synthetic test devices are interchangeable.

mod bitstats;
mod camera;
mod microphone;
mod os;

pub(crate) use bitstats::BYTE_BIT_PROBS;
pub use bitstats::BitStats;
pub use camera::{CameraDevice, CameraEntropySource, SyntheticCameraDevice};
pub use microphone::{AudioDevice, MicrophoneEntropySource, SyntheticAudioDevice};
pub use os::OsEntropySource;

use thiserror::Error;

/// Errors raised when an entropy provider cannot be reached.
///
/// These are fatal for the current initialisation attempt, distinct
/// from quality-threshold failures which the caller may retry.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The audio capture backend could not be opened or read.
    #[error("audio device unavailable: {0}")]
    AudioUnavailable(String),
    /// The camera backend could not be opened or read.
    #[error("camera device unavailable: {0}")]
    CameraUnavailable(String),
    /// The operating system randomness source failed.
    #[error("OS random generator unavailable: {0}")]
    OsRngUnavailable(String),
}

/// Contract implemented by every entropy provider.
///
/// A source is drained at most once per capture cycle: `append_data`
/// moves everything accumulated so far into `dst` and resets the
/// source, including its bit statistics.
pub trait RandomSource {
    /// Appends all accumulated raw sample bytes to `dst`, then empties
    /// the source and zeroes its statistics. Safe to call when empty.
    fn append_data(&mut self, dst: &mut Vec<u8>);

    /// Per-bit occurrence probabilities for the source's sample width
    /// (8 entries for byte samples, 16 for 16-bit samples). Returns
    /// zeros of the correct length when no samples are present.
    fn bit_entropy(&self) -> Vec<f64>;
}
