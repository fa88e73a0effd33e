//! Entropy-Seeded ISAAC Pool
//!
//! A cryptographically-oriented pseudo-random byte producer with
//! persistent, optionally-encrypted state. Entropy is mined from
//! physical and system sources, quality-gated and conditioned into a
//! seed; the seed drives an ISAAC-32 generator whose raw stream is
//! whitened through SHA3-256 before it reaches callers; the
//! generator's full state survives restarts through an authenticated
//! file channel bound to a caller-supplied key.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! sources (camera / OS / microphone)
//!     → mixer (threshold gates + split SHA3-512)
//!         → isaac (seeded generator, persistent state)
//!             → pool (SHA3-256 whitened output)
//!
//! isaac ⇄ vault (AES-256-GCM state file)
//! ```
//!
//! # Design principles
//!
//! - **Gate before absorbing**: data below the bit-occurrence
//!   threshold never reaches the seed hashes
//! - **Over-sample on output**: every output bit is distilled from
//!   16 bits of generator stream
//! - **The key is the security boundary for persistence**: state files
//!   use a fixed IV and expect one key per file
//! - **Device drivers stay outside**: capture hardware is reached only
//!   through the narrow [`AudioDevice`] / [`CameraDevice`] traits
//!
//! # Example
//!
//! ```no_run
//! use isaac_pool::{RandomPool, SourceSet, SyntheticAudioDevice};
//!
//! let mut pool = RandomPool::new();
//!
//! // Use whatever capture hardware is present; the OS generator
//! // compensates for anything missing.
//! let sources = SourceSet {
//!     audio: Some(Box::new(SyntheticAudioDevice::new())),
//!     camera: None,
//! };
//!
//! pool.initialize("./.rngstate", 0, &[], sources).unwrap();
//!
//! let mut block = [0u8; 32];
//! pool.generate_block(&mut block).unwrap();
//!
//! // Flush generator state for the next run.
//! pool.destroy();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod convert;
pub mod isaac;
pub mod mixer;
pub mod pipeline;
pub mod pool;
pub mod sources;
pub mod vault;

// Re-export commonly used types at crate root
pub use isaac::{IsaacEngine, LoadError, ALPHA, STATE_WORDS};
pub use mixer::{MixerError, SeedMixer, SeedTerm, ENTROPY_THRESHOLD};
pub use pipeline::{EntropyStrength, InitError, PipelineConfig, SourceSet};
pub use pool::{RandomPool, Status, UninitializedError};
pub use sources::{
    AudioDevice, CameraDevice, CameraEntropySource, DeviceError, MicrophoneEntropySource,
    OsEntropySource, RandomSource, SyntheticAudioDevice, SyntheticCameraDevice,
};
pub use vault::{FileVault, VaultError, KEY_LEN};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
