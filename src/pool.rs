//! The random pool: pipeline, generator and persistence tied together.
//!
//! Output does not come straight off the generator. Each 32-byte block
//! is the SHA3-256 digest of 512 bytes of raw stream (a 16x
//! over-sample), which spreads entropy uniformly across the output
//! even if the underlying stream has localised weakness.

use crate::convert::push_u32_le;
use crate::isaac::{IsaacEngine, LoadError, STATE_WORDS};
use crate::pipeline::{self, InitError, PipelineConfig, SourceSet};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

/// Generator words hashed into each 32-byte output block.
const WORDS_PER_BLOCK: usize = 128;

/// Outcome codes at the public boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    /// Operation succeeded.
    Success = 0,
    /// No state file at the given path.
    FileNotFound = -1,
    /// State file present but failed decryption or parsing.
    DecryptionError = -2,
    /// Gathered data did not meet the quality gates.
    EntropyError = -3,
    /// The generator is not initialised.
    RngInitError = -4,
}

impl Status {
    /// The numeric code for callers that speak integers.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// `generate_block` was called before the pool was initialised.
#[derive(Debug, Error)]
#[error("random pool has not been initialized")]
pub struct UninitializedError;

impl From<&InitError> for Status {
    fn from(error: &InitError) -> Self {
        match error {
            InitError::Entropy(_) => Status::EntropyError,
            InitError::Device(_) => Status::RngInitError,
        }
    }
}

/// Entropy-seeded random pool with whitened output and persistent
/// generator state.
///
/// The pool owns one [`IsaacEngine`] and builds its entropy sources
/// per initialisation run; it keeps no other state. Not thread-safe:
/// operations take `&mut self` and the state file belongs to the
/// active engine alone.
pub struct RandomPool {
    engine: IsaacEngine,
    config: PipelineConfig,
}

impl RandomPool {
    /// Creates a pool with the default pipeline tuning.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Creates a pool with caller-supplied pipeline tuning.
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            engine: IsaacEngine::new(),
            config,
        }
    }

    /// Fills `output` with whitened random bytes.
    ///
    /// Fails when the pool has never been seeded or restored - unlike
    /// the engine's own `rand`, which quietly yields zeros.
    pub fn generate_block(&mut self, output: &mut [u8]) -> Result<(), UninitializedError> {
        if !self.engine.initialized() {
            return Err(UninitializedError);
        }

        let mut written = 0;
        while written < output.len() {
            let mut words = [0u32; WORDS_PER_BLOCK];
            for word in &mut words {
                *word = self.engine.rand();
            }

            let mut stream = Vec::with_capacity(WORDS_PER_BLOCK * 4);
            push_u32_le(&mut stream, &words);
            let digest = Sha3_256::digest(&stream);

            let take = (output.len() - written).min(digest.len());
            output[written..written + take].copy_from_slice(&digest[..take]);
            written += take;
        }

        Ok(())
    }

    /// Attempts to restore the generator from `file`, decrypting with
    /// `key` when non-empty, and reports the outcome.
    pub fn is_initialized(&mut self, file: &str, key: &[u8]) -> Status {
        match self.engine.resume(file, key) {
            Ok(()) => Status::Success,
            Err(LoadError::NotFound) => Status::FileNotFound,
            Err(LoadError::Invalid) => Status::DecryptionError,
        }
    }

    /// Discards any current state, then mines fresh entropy and seeds
    /// the generator.
    ///
    /// `file` becomes the state identifier and `key` the state
    /// encryption key. `multiplier` scales the capture budgets as an
    /// exponent of two. After seeding, [`BURN`] words are drawn and
    /// discarded so the generator reaches a stable mixing regime
    /// before any output is visible.
    ///
    /// [`BURN`]: crate::pipeline::BURN
    pub fn initialize(
        &mut self,
        file: &str,
        multiplier: u32,
        key: &[u8],
        sources: SourceSet,
    ) -> Result<(), InitError> {
        self.engine.destroy();
        self.engine.set_identifier(file);
        self.engine.set_key(key);

        let seed = pipeline::gather_seed(&self.config, sources, multiplier)?;
        self.seed_engine(&seed);

        tracing::info!(identifier = self.engine.identifier(), "pool initialised");
        Ok(())
    }

    /// Replaces the stored state encryption key.
    pub fn initialize_encryption(&mut self, key: &[u8]) {
        self.engine.set_key(key);
    }

    /// Flushes generator state to the stored identifier.
    pub fn save_state(&self) -> Status {
        if self.engine.save_state() {
            Status::Success
        } else {
            Status::RngInitError
        }
    }

    /// Flushes state if initialised and resets the pool to the
    /// unseeded configuration.
    pub fn destroy(&mut self) {
        self.engine.destroy();
    }

    /// Returns true once the pool has been seeded or restored.
    #[inline]
    pub fn is_seeded(&self) -> bool {
        self.engine.initialized()
    }

    /// The pipeline tuning in effect.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn seed_engine(&mut self, seed: &[u32; STATE_WORDS]) {
        self.engine.seed(seed, 0, 0, 0);
        for _ in 0..self.config.burn {
            self.engine.rand();
        }
    }
}

impl Default for RandomPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SyntheticAudioDevice;
    use tempfile::tempdir;

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            capture_frames: 1,
            os_random_bytes: 64 * 1024,
            mic_sleep_ms: 30,
            ..PipelineConfig::default()
        }
    }

    fn counting_seed() -> [u32; STATE_WORDS] {
        let mut seed = [0u32; STATE_WORDS];
        for (i, term) in seed.iter_mut().enumerate() {
            *term = i as u32 ^ 0xdead_beef;
        }
        seed
    }

    #[test]
    fn test_generate_block_requires_seeding() {
        let mut pool = RandomPool::new();
        let mut block = [0u8; 32];
        assert!(pool.generate_block(&mut block).is_err());
        assert!(!pool.is_seeded());
    }

    #[test]
    fn test_generate_block_exact_sizes() {
        let mut pool = RandomPool::new();
        pool.seed_engine(&counting_seed());

        for size in [0usize, 1, 31, 32, 33, 1024] {
            let mut block = vec![0xCCu8; size];
            pool.generate_block(&mut block).unwrap();
            assert_eq!(block.len(), size);
            if size >= 4 {
                assert!(
                    block.iter().any(|&b| b != 0xCC),
                    "size {size} left untouched"
                );
            }
        }
    }

    #[test]
    fn test_output_is_whitened_generator_stream() {
        let mut pool = RandomPool::new();
        pool.seed_engine(&counting_seed());

        // Mirror the pool: same seed, the burn, then one block's worth
        // of raw words hashed down.
        let mut reference = IsaacEngine::new();
        reference.seed(&counting_seed(), 0, 0, 0);
        for _ in 0..pool.config.burn {
            reference.rand();
        }
        let words: Vec<u32> = (0..WORDS_PER_BLOCK).map(|_| reference.rand()).collect();
        let mut stream = Vec::new();
        push_u32_le(&mut stream, &words);
        let expected = Sha3_256::digest(&stream);

        let mut block = [0u8; 32];
        pool.generate_block(&mut block).unwrap();
        assert_eq!(block.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_block_popcount_is_plausible() {
        let mut pool = RandomPool::new();
        pool.seed_engine(&counting_seed());

        let mut block = [0u8; 32];
        pool.generate_block(&mut block).unwrap();
        let ones: u32 = block.iter().map(|b| b.count_ones()).sum();
        assert!(ones > 0, "all 256 output bits clear");
    }

    #[test]
    fn test_fresh_initialize_and_generate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".state").to_str().unwrap().to_string();

        let mut pool = RandomPool::with_config(small_config());
        pool.initialize(&path, 0, &[], SourceSet::os_only()).unwrap();
        assert!(pool.is_seeded());

        let mut block = [0u8; 32];
        pool.generate_block(&mut block).unwrap();
        assert!(block.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_initialize_with_devices() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".state").to_str().unwrap().to_string();

        let sources = SourceSet {
            audio: Some(Box::new(SyntheticAudioDevice::new())),
            camera: None,
        };
        let mut pool = RandomPool::with_config(small_config());
        pool.initialize(&path, 0, &[], sources).unwrap();
        assert!(pool.is_seeded());
    }

    #[test]
    fn test_missing_state_file_reported() {
        let mut pool = RandomPool::new();
        assert_eq!(pool.is_initialized("dummy_path", &[]), Status::FileNotFound);
    }

    #[test]
    fn test_encrypted_state_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".state").to_str().unwrap().to_string();
        let key = [1u8; 32];

        let mut pool = RandomPool::with_config(small_config());
        pool.initialize(&path, 0, &[], SourceSet::os_only()).unwrap();
        pool.initialize_encryption(&key);
        pool.destroy();
        assert!(!pool.is_seeded());

        let mut restored = RandomPool::new();
        assert_eq!(restored.is_initialized(&path, &key), Status::Success);
        let mut block = [0u8; 32];
        restored.generate_block(&mut block).unwrap();

        let mut wrong = RandomPool::new();
        assert_eq!(
            wrong.is_initialized(&path, &[2u8; 32]),
            Status::DecryptionError
        );
    }

    #[test]
    fn test_save_state_before_seeding_fails() {
        let pool = RandomPool::new();
        assert_eq!(pool.save_state(), Status::RngInitError);
    }

    #[test]
    fn test_save_state_after_initialize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".state").to_str().unwrap().to_string();

        let mut pool = RandomPool::with_config(small_config());
        pool.initialize(&path, 0, &[], SourceSet::os_only()).unwrap();
        assert_eq!(pool.save_state(), Status::Success);
        assert!(std::path::Path::new(&path).exists());
    }

    #[test]
    fn test_init_error_maps_to_status() {
        use crate::mixer::MixerError;
        use crate::sources::DeviceError;

        let entropy = InitError::from(MixerError::SeedNotReady);
        assert_eq!(Status::from(&entropy), Status::EntropyError);

        let device = InitError::from(DeviceError::OsRngUnavailable("gone".into()));
        assert_eq!(Status::from(&device), Status::RngInitError);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(Status::FileNotFound.code(), -1);
        assert_eq!(Status::DecryptionError.code(), -2);
        assert_eq!(Status::EntropyError.code(), -3);
        assert_eq!(Status::RngInitError.code(), -4);
    }

    #[test]
    fn test_two_pools_diverge() {
        let mut first = RandomPool::new();
        let mut second = RandomPool::new();
        first.seed_engine(&counting_seed());
        let mut other = counting_seed();
        other[17] = !other[17];
        second.seed_engine(&other);

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        first.generate_block(&mut a).unwrap();
        second.generate_block(&mut b).unwrap();
        assert_ne!(a, b);
    }
}
