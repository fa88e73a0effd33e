//! Entropy pipeline orchestration.
//!
//! Composes whichever capture devices are available with the OS
//! generator, compensating for missing physical sources by drawing
//! more OS bytes, and funnels everything through the seed mixer in a
//! fixed order: camera, OS, microphone.

use crate::isaac::STATE_WORDS;
use crate::mixer::{MixerError, SeedMixer};
use crate::sources::{
    AudioDevice, CameraDevice, CameraEntropySource, DeviceError, MicrophoneEntropySource,
    OsEntropySource,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Frames captured from the camera per pipeline run (before the
/// multiplier).
pub const NUM_CAPTURE_FRAMES: usize = 15;

/// Bytes drawn from the OS generator per pipeline run (before the
/// multiplier and compensation).
pub const NUM_OS_RANDOM_BYTES: usize = 25 * 1024 * 1024;

/// Milliseconds the pipeline sleeps to let the microphone accumulate.
pub const NUM_MIC_SLEEP_MS: u64 = 1000;

/// Seed mixer partition count.
pub const ENTROPY_SPLIT: usize = 16;

/// Words drawn and discarded after seeding.
pub const BURN: usize = 512;

/// Why initialisation failed.
///
/// Threshold failures are recoverable (retry with a larger multiplier
/// or a different source set); device failures are fatal for the
/// attempt.
#[derive(Debug, Error)]
pub enum InitError {
    /// Gathered data did not meet the quality gates.
    #[error("entropy gathering failed: {0}")]
    Entropy(#[from] MixerError),
    /// An entropy provider could not be reached.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Invalid pipeline configuration values.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The mixer needs at least one partition.
    #[error("seed split count must be at least 1")]
    InvalidSplits,
    /// The OS byte budget cannot be zero.
    #[error("OS random byte budget must be non-zero")]
    InvalidOsBytes,
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The configuration file could not be parsed.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Tuning knobs for the entropy pipeline.
///
/// The defaults are the frozen values the seed derivation was
/// characterised with; change them only for testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Camera frames per run (scaled by the multiplier).
    pub capture_frames: usize,
    /// OS bytes per run (scaled by the multiplier plus compensation).
    pub os_random_bytes: usize,
    /// Sleep giving the microphone time to accumulate samples.
    pub mic_sleep_ms: u64,
    /// Mixer partition count.
    pub seed_splits: usize,
    /// Words discarded after seeding.
    pub burn: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_frames: NUM_CAPTURE_FRAMES,
            os_random_bytes: NUM_OS_RANDOM_BYTES,
            mic_sleep_ms: NUM_MIC_SLEEP_MS,
            seed_splits: ENTROPY_SPLIT,
            burn: BURN,
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a TOML file. Missing fields fall back
    /// to the frozen defaults.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: PipelineConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seed_splits == 0 {
            return Err(ConfigError::InvalidSplits);
        }
        if self.os_random_bytes == 0 {
            return Err(ConfigError::InvalidOsBytes);
        }
        Ok(())
    }
}

/// The capture devices available to a pipeline run.
///
/// Presence of a device is the runtime equivalent of a build-time
/// capability flag; the OS generator is always available.
pub struct SourceSet {
    /// Audio capture backend, if a microphone is available.
    pub audio: Option<Box<dyn AudioDevice>>,
    /// Frame capture backend, if a camera is available.
    pub camera: Option<Box<dyn CameraDevice>>,
}

impl SourceSet {
    /// A set with no physical devices; the OS generator compensates.
    pub fn os_only() -> Self {
        Self {
            audio: None,
            camera: None,
        }
    }

    /// Rates the available sources.
    pub fn strength(&self) -> EntropyStrength {
        match (self.audio.is_some(), self.camera.is_some()) {
            (true, true) => EntropyStrength::Strong,
            (false, false) => EntropyStrength::Weak,
            _ => EntropyStrength::Medium,
        }
    }
}

/// How much independent physical entropy a source set can mine.
///
/// OS-only is weak, one physical device is medium, microphone and
/// camera together are strong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyStrength {
    /// OS generator only.
    Weak,
    /// One physical device plus the OS generator.
    Medium,
    /// Microphone, camera and the OS generator.
    Strong,
}

impl fmt::Display for EntropyStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntropyStrength::Weak => "weak",
            EntropyStrength::Medium => "medium",
            EntropyStrength::Strong => "strong",
        };
        f.write_str(label)
    }
}

/// Runs the pipeline and derives a 256-word seed.
///
/// `multiplier` scales every capture budget as an exponent of two and
/// is expected to stay small. Missing devices raise the OS budget
/// exponent by one each (the compensation).
pub(crate) fn gather_seed(
    config: &PipelineConfig,
    sources: SourceSet,
    multiplier: u32,
) -> Result<[u32; STATE_WORDS], InitError> {
    let strength = sources.strength();
    let SourceSet { audio, camera } = sources;
    let mut mixer = SeedMixer::new(config.seed_splits);

    tracing::info!(%strength, multiplier, "gathering entropy");

    if let Some(audio_device) = audio {
        let mut microphone = MicrophoneEntropySource::new();
        microphone.init_flow(audio_device)?;

        let mut compensation = 0u32;
        let mut camera_source = None;
        if let Some(mut camera_device) = camera {
            let mut source = CameraEntropySource::new();
            source.capture_frames(
                camera_device.as_mut(),
                config.capture_frames << multiplier,
            )?;
            camera_source = Some(source);
        } else {
            compensation = 1;
        }

        let mut os = OsEntropySource::new();
        os.generate_random_bytes(config.os_random_bytes << (multiplier + compensation))?;

        // Give the capture thread its accumulation window, then
        // quiesce it before the buffers are touched.
        thread::sleep(Duration::from_millis(config.mic_sleep_ms));
        microphone.stop_flow();

        if let Some(mut source) = camera_source {
            mixer.process_from_source(&mut source)?;
        }
        mixer.process_from_source(&mut os)?;
        mixer.process_from_source(&mut microphone)?;
    } else if let Some(mut camera_device) = camera {
        let mut source = CameraEntropySource::new();
        source.capture_frames(camera_device.as_mut(), config.capture_frames << multiplier)?;

        let mut os = OsEntropySource::new();
        os.generate_random_bytes(config.os_random_bytes << (multiplier + 1))?;

        mixer.process_from_source(&mut source)?;
        mixer.process_from_source(&mut os)?;
    } else {
        let mut os = OsEntropySource::new();
        os.generate_random_bytes(config.os_random_bytes << (multiplier + 2))?;
        mixer.process_from_source(&mut os)?;
    }

    mixer.generate_seed();
    let mut seed = [0u32; STATE_WORDS];
    mixer.copy_seed(&mut seed)?;
    Ok(seed)
}
