//! The ISAAC-32 engine with save/restore support.

use super::state::{self, PersistedState};
use super::STATE_WORDS;
use crate::vault::{FileVault, VaultError};
use rand_core::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

/// State-file identifier used until the caller sets one.
pub const DEFAULT_STATE_PATH: &str = "./.isaacrngstate";

const GOLDEN_RATIO: u32 = 0x9e37_79b9;
const HALF: usize = STATE_WORDS / 2;

/// How a state restore failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    /// No state file at the given path.
    #[error("no saved state at the given path")]
    NotFound,
    /// The file exists but could not be decrypted or parsed.
    #[error("saved state could not be decrypted or parsed")]
    Invalid,
}

/// ISAAC-32 generator (ALPHA = 8) whose full state can be flushed to
/// and restored from an authenticated state file.
///
/// A fresh engine is uninitialised: `rand` yields 0 until the engine is
/// either seeded or restored from disk. `destroy` flushes state and
/// returns the engine to the uninitialised configuration.
pub struct IsaacEngine {
    cnt: u32,
    rsl: [u32; STATE_WORDS],
    mem: [u32; STATE_WORDS],
    a: u32,
    b: u32,
    c: u32,
    state_path: String,
    key: Vec<u8>,
    initialized: bool,
}

impl IsaacEngine {
    /// Creates an uninitialised engine bound to the default state path.
    pub fn new() -> Self {
        Self {
            cnt: 0,
            rsl: [0; STATE_WORDS],
            mem: [0; STATE_WORDS],
            a: 0,
            b: 0,
            c: 0,
            state_path: DEFAULT_STATE_PATH.to_string(),
            key: Vec::new(),
            initialized: false,
        }
    }

    /// Returns true once the engine has been seeded or restored.
    #[inline]
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// The normalised state-file identifier currently in effect.
    #[inline]
    pub fn identifier(&self) -> &str {
        &self.state_path
    }

    /// Normalises and stores the state-file identifier.
    pub fn set_identifier(&mut self, file: &str) {
        self.state_path = normalize_identifier(file);
    }

    /// Replaces the stored encryption key. The previous key is wiped
    /// before the buffer is reused.
    pub fn set_key(&mut self, key: &[u8]) {
        self.key.zeroize();
        self.key.extend_from_slice(key);
    }

    /// Seeds the engine from 256 words, marking it initialised.
    pub fn seed(&mut self, seed: &[u32; STATE_WORDS], a: u32, b: u32, c: u32) {
        self.rsl = *seed;
        self.a = a;
        self.b = b;
        self.c = c;
        self.randinit(true);
        self.initialized = true;
        tracing::info!("generator seeded");
    }

    /// Draws the next 32-bit word. An uninitialised engine yields 0.
    pub fn rand(&mut self) -> u32 {
        if !self.initialized {
            return 0;
        }

        if self.cnt == 0 {
            self.isaac_round();
            self.cnt = STATE_WORDS as u32 - 1;
        } else {
            self.cnt -= 1;
        }
        self.rsl[self.cnt as usize]
    }

    /// Restores state from `file`, decrypting with `key` when it is
    /// non-empty. On success the engine adopts the given identifier
    /// and key and becomes initialised.
    pub fn load_from_file(&mut self, file: &str, key: &[u8]) -> Result<(), LoadError> {
        let path = normalize_identifier(file);
        let vault = FileVault::new(path.as_str());

        if !vault.exists() {
            self.initialized = false;
            return Err(LoadError::NotFound);
        }

        let bytes = match vault.read(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(error = %e, path = %path, "state read failed");
                self.initialized = false;
                return Err(match e {
                    VaultError::NotFound(_) => LoadError::NotFound,
                    _ => LoadError::Invalid,
                });
            }
        };

        let record = match std::str::from_utf8(&bytes) {
            Ok(record) => record,
            Err(_) => {
                self.initialized = false;
                return Err(LoadError::Invalid);
            }
        };

        let loaded = match state::decode(record) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::debug!(error = %e, path = %path, "state parse failed");
                self.initialized = false;
                return Err(LoadError::Invalid);
            }
        };

        self.cnt = loaded.cnt;
        self.rsl = loaded.rsl;
        self.mem = loaded.mem;
        self.a = loaded.a;
        self.b = loaded.b;
        self.c = loaded.c;
        self.state_path = path;
        self.set_key(key);
        self.initialized = true;

        tracing::info!(path = %self.state_path, "generator state restored");
        Ok(())
    }

    /// Restores from `file` unless the engine is already initialised
    /// against the same identifier and key, in which case this is a
    /// no-op success.
    pub fn resume(&mut self, file: &str, key: &[u8]) -> Result<(), LoadError> {
        let path = normalize_identifier(file);
        if self.initialized && self.state_path == path && self.key == key {
            return Ok(());
        }
        self.load_from_file(file, key)
    }

    /// Flushes the current state to the stored identifier.
    ///
    /// Returns false when the engine is uninitialised or the write
    /// fails; generation continues either way.
    pub fn save_state(&self) -> bool {
        if !self.initialized {
            return false;
        }

        match self.write_state() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.state_path, "state save failed");
                false
            }
        }
    }

    /// Flushes state if initialised, then clears the key, resets the
    /// identifier to the default and marks the engine uninitialised.
    pub fn destroy(&mut self) {
        if self.initialized {
            self.save_state();
        }
        self.key.zeroize();
        self.state_path = DEFAULT_STATE_PATH.to_string();
        self.initialized = false;
    }

    fn write_state(&self) -> Result<(), VaultError> {
        let record = state::encode(&PersistedState {
            cnt: self.cnt,
            rsl: self.rsl,
            mem: self.mem,
            a: self.a,
            b: self.b,
            c: self.c,
        });
        FileVault::new(self.state_path.as_str()).write(record.as_bytes(), &self.key)
    }

    /// Initial mixing: golden-ratio registers, four scramble rounds,
    /// then either two passes absorbing `rsl` into `mem` (seeded) or
    /// one shuffle-only fill, followed by a first generation round.
    fn randinit(&mut self, use_seed: bool) {
        let mut s = [GOLDEN_RATIO; 8];

        if !use_seed {
            self.a = 0;
            self.b = 0;
            self.c = 0;
        }

        for _ in 0..4 {
            mix(&mut s);
        }

        if use_seed {
            for i in (0..STATE_WORDS).step_by(8) {
                for j in 0..8 {
                    s[j] = s[j].wrapping_add(self.rsl[i + j]);
                }
                mix(&mut s);
                self.mem[i..i + 8].copy_from_slice(&s);
            }
            // Second pass so every seed word affects all of mem.
            for i in (0..STATE_WORDS).step_by(8) {
                for j in 0..8 {
                    s[j] = s[j].wrapping_add(self.mem[i + j]);
                }
                mix(&mut s);
                self.mem[i..i + 8].copy_from_slice(&s);
            }
        } else {
            for i in (0..STATE_WORDS).step_by(8) {
                mix(&mut s);
                self.mem[i..i + 8].copy_from_slice(&s);
            }
        }

        self.isaac_round();
        self.cnt = STATE_WORDS as u32;
    }

    /// One full generation round refilling `rsl` from `mem`.
    fn isaac_round(&mut self) {
        self.c = self.c.wrapping_add(1);
        let mut a = self.a;
        let mut b = self.b.wrapping_add(self.c);

        for i in 0..HALF {
            let mixed = match i % 4 {
                0 => a << 13,
                1 => a >> 6,
                2 => a << 2,
                _ => a >> 16,
            };
            let x = self.mem[i];
            a = (a ^ mixed).wrapping_add(self.mem[HALF + i]);
            let y = self.ind(x).wrapping_add(a).wrapping_add(b);
            self.mem[i] = y;
            b = self.ind(y >> super::ALPHA).wrapping_add(x);
            self.rsl[i] = b;
        }

        for i in 0..HALF {
            let mixed = match i % 4 {
                0 => a << 13,
                1 => a >> 6,
                2 => a << 2,
                _ => a >> 16,
            };
            let x = self.mem[HALF + i];
            a = (a ^ mixed).wrapping_add(self.mem[i]);
            let y = self.ind(x).wrapping_add(a).wrapping_add(b);
            self.mem[HALF + i] = y;
            b = self.ind(y >> super::ALPHA).wrapping_add(x);
            self.rsl[HALF + i] = b;
        }

        self.a = a;
        self.b = b;
    }

    /// Indirection into `mem`, indexed by the middle bits of `x`.
    #[inline]
    fn ind(&self, x: u32) -> u32 {
        self.mem[((x >> 2) & (STATE_WORDS as u32 - 1)) as usize]
    }
}

impl Default for IsaacEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for IsaacEngine {
    fn next_u32(&mut self) -> u32 {
        self.rand()
    }

    fn next_u64(&mut self) -> u64 {
        let lo = self.rand() as u64;
        let hi = self.rand() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(4);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.rand().to_le_bytes());
        }
        let remainder = chunks.into_remainder();
        if !remainder.is_empty() {
            let bytes = self.rand().to_le_bytes();
            remainder.copy_from_slice(&bytes[..remainder.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// The eight-step mixing round with the canonical 32-bit shift
/// constants.
fn mix(s: &mut [u32; 8]) {
    s[0] ^= s[1] << 11;
    s[3] = s[3].wrapping_add(s[0]);
    s[1] = s[1].wrapping_add(s[2]);
    s[1] ^= s[2] >> 2;
    s[4] = s[4].wrapping_add(s[1]);
    s[2] = s[2].wrapping_add(s[3]);
    s[2] ^= s[3] << 8;
    s[5] = s[5].wrapping_add(s[2]);
    s[3] = s[3].wrapping_add(s[4]);
    s[3] ^= s[4] >> 16;
    s[6] = s[6].wrapping_add(s[3]);
    s[4] = s[4].wrapping_add(s[5]);
    s[4] ^= s[5] << 10;
    s[7] = s[7].wrapping_add(s[4]);
    s[5] = s[5].wrapping_add(s[6]);
    s[5] ^= s[6] >> 4;
    s[0] = s[0].wrapping_add(s[5]);
    s[6] = s[6].wrapping_add(s[7]);
    s[6] ^= s[7] << 8;
    s[1] = s[1].wrapping_add(s[6]);
    s[7] = s[7].wrapping_add(s[0]);
    s[7] ^= s[0] >> 9;
    s[2] = s[2].wrapping_add(s[7]);
    s[0] = s[0].wrapping_add(s[1]);
}

/// Normalises a state-file identifier: a bare name becomes `./<name>`;
/// otherwise the filename component (which keeps its leading `/`) is
/// truncated to at most 32 bytes and the directory part is preserved.
fn normalize_identifier(file: &str) -> String {
    match file.rfind('/') {
        None => format!("./{file}"),
        Some(pos) => {
            let (dir, name) = file.split_at(pos);
            let mut end = name.len().min(32);
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            format!("{dir}{}", &name[..end])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn counting_seed() -> [u32; STATE_WORDS] {
        let mut seed = [0u32; STATE_WORDS];
        for (i, term) in seed.iter_mut().enumerate() {
            *term = i as u32 * 0x9e37 + 1;
        }
        seed
    }

    #[test]
    fn test_uninitialised_rand_is_zero() {
        let mut engine = IsaacEngine::new();
        for _ in 0..16 {
            assert_eq!(engine.rand(), 0);
        }
        assert!(!engine.initialized());
    }

    #[test]
    fn test_same_seed_same_stream() {
        let seed = counting_seed();
        let mut first = IsaacEngine::new();
        let mut second = IsaacEngine::new();
        first.seed(&seed, 0, 0, 0);
        second.seed(&seed, 0, 0, 0);

        for i in 0..1000 {
            assert_eq!(first.rand(), second.rand(), "diverged at word {i}");
        }
    }

    #[test]
    fn test_different_seed_different_stream() {
        let mut first = IsaacEngine::new();
        let mut second = IsaacEngine::new();
        let mut other = counting_seed();
        other[0] ^= 1;
        first.seed(&counting_seed(), 0, 0, 0);
        second.seed(&other, 0, 0, 0);

        let diverged = (0..64).any(|_| first.rand() != second.rand());
        assert!(diverged);
    }

    #[test]
    fn test_refill_crosses_block_boundary() {
        let mut engine = IsaacEngine::new();
        engine.seed(&counting_seed(), 0, 0, 0);

        // Three full result blocks plus change.
        let words: Vec<u32> = (0..3 * STATE_WORDS + 17).map(|_| engine.rand()).collect();
        let zeroes = words.iter().filter(|&&w| w == 0).count();
        assert!(zeroes < 4, "{zeroes} zero words in 785");
    }

    #[test]
    fn test_registers_seeded_through() {
        let seed = counting_seed();
        let mut plain = IsaacEngine::new();
        let mut offset = IsaacEngine::new();
        plain.seed(&seed, 0, 0, 0);
        offset.seed(&seed, 5, 7, 11);

        let diverged = (0..16).any(|_| plain.rand() != offset.rand());
        assert!(diverged);
    }

    #[test]
    fn test_save_then_load_arrays_bitwise() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").to_str().unwrap().to_string();

        let mut engine = IsaacEngine::new();
        engine.set_identifier(&path);
        engine.seed(&counting_seed(), 0, 0, 0);
        for _ in 0..100 {
            engine.rand();
        }
        assert!(engine.save_state());

        let mut restored = IsaacEngine::new();
        restored.load_from_file(&path, &[]).unwrap();

        assert_eq!(restored.cnt, engine.cnt);
        assert_eq!(restored.rsl, engine.rsl);
        assert_eq!(restored.mem, engine.mem);
        // The trailing scalars shift by one slot on load; the last one
        // has no token at all.
        assert_eq!(restored.a, engine.b);
        assert_eq!(restored.b, engine.c);
        assert_eq!(restored.c, 0);
        assert!(restored.initialized());
    }

    #[test]
    fn test_encrypted_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sealed").to_str().unwrap().to_string();
        let key = [7u8; 32];

        let mut engine = IsaacEngine::new();
        engine.set_identifier(&path);
        engine.set_key(&key);
        engine.seed(&counting_seed(), 0, 0, 0);
        assert!(engine.save_state());

        let mut restored = IsaacEngine::new();
        restored.load_from_file(&path, &key).unwrap();
        assert_eq!(restored.rsl, engine.rsl);

        let mut wrong = IsaacEngine::new();
        assert_eq!(
            wrong.load_from_file(&path, &[8u8; 32]),
            Err(LoadError::Invalid)
        );
        assert!(!wrong.initialized());
    }

    #[test]
    fn test_load_missing_file() {
        let mut engine = IsaacEngine::new();
        assert_eq!(
            engine.load_from_file("/nonexistent/dir/state", &[]),
            Err(LoadError::NotFound)
        );
        assert!(!engine.initialized());
    }

    #[test]
    fn test_corrupt_record_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbled").to_str().unwrap().to_string();
        std::fs::write(&path, "1 2 3 not numbers").unwrap();

        let mut engine = IsaacEngine::new();
        assert_eq!(engine.load_from_file(&path, &[]), Err(LoadError::Invalid));
    }

    #[test]
    fn test_resume_short_circuits_matching_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").to_str().unwrap().to_string();

        let mut engine = IsaacEngine::new();
        engine.set_identifier(&path);
        engine.seed(&counting_seed(), 0, 0, 0);
        assert!(engine.save_state());

        let mut other = IsaacEngine::new();
        other.resume(&path, &[]).unwrap();
        let before = other.cnt;

        // Same path and key: no reload, counters untouched.
        other.rand();
        other.resume(&path, &[]).unwrap();
        assert_eq!(other.cnt, before - 1);
    }

    #[test]
    fn test_destroy_flushes_and_resets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flush").to_str().unwrap().to_string();

        let mut engine = IsaacEngine::new();
        engine.set_identifier(&path);
        engine.set_key(&[9u8; 32]);
        engine.seed(&counting_seed(), 0, 0, 0);
        engine.destroy();

        assert!(!engine.initialized());
        assert_eq!(engine.identifier(), DEFAULT_STATE_PATH);
        assert_eq!(engine.rand(), 0);
        assert!(std::path::Path::new(&path).exists());

        // A second destroy has nothing to flush and stays quiet.
        engine.destroy();
    }

    #[test]
    fn test_save_uninitialised_fails() {
        let engine = IsaacEngine::new();
        assert!(!engine.save_state());
    }

    #[test]
    fn test_identifier_normalisation() {
        assert_eq!(normalize_identifier("state"), "./state");
        assert_eq!(normalize_identifier("./state"), "./state");
        assert_eq!(normalize_identifier("/var/lib/rng"), "/var/lib/rng");

        let long = format!("/tmp/{}", "x".repeat(64));
        let normalised = normalize_identifier(&long);
        // The filename component keeps its leading slash and is capped
        // at 32 bytes.
        assert_eq!(normalised, format!("/tmp/{}", "x".repeat(31)));
    }

    #[test]
    fn test_fill_bytes_covers_partial_words() {
        let mut engine = IsaacEngine::new();
        engine.seed(&counting_seed(), 0, 0, 0);

        let mut buf = [0u8; 11];
        engine.fill_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_loaded_state_continues_deterministically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twins").to_str().unwrap().to_string();

        let mut engine = IsaacEngine::new();
        engine.set_identifier(&path);
        engine.seed(&counting_seed(), 0, 0, 0);
        assert!(engine.save_state());

        let mut first = IsaacEngine::new();
        let mut second = IsaacEngine::new();
        first.load_from_file(&path, &[]).unwrap();
        second.load_from_file(&path, &[]).unwrap();

        for _ in 0..600 {
            assert_eq!(first.rand(), second.rand());
        }
    }
}
