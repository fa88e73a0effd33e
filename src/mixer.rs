//! Seed conditioning over partitioned entropy streams.
//!
//! The mixer owns N independent rolling SHA3-512 contexts. Every feed
//! is quality-gated twice: once on the source's own per-bit statistics,
//! then per partition against the static byte table. Splitting the
//! input across independent hashes decorrelates the final seed across
//! entropy substreams.

use crate::sources::{RandomSource, BYTE_BIT_PROBS};
use sha3::{Digest, Sha3_512};
use thiserror::Error;

/// Minimum mean bit-occurrence probability accepted from a source or
/// partition. A coarse quality gate, not an entropy estimator.
pub const ENTROPY_THRESHOLD: f64 = 0.25;

/// Bytes per finalised partition digest.
const DIGEST_SIZE: usize = 64;

/// Errors raised while mixing entropy into a seed.
#[derive(Debug, Error)]
pub enum MixerError {
    /// A seed is pending; copy it out or reset before feeding more.
    #[error("seed already generated; copy it out or reset before feeding more data")]
    SeedLocked,
    /// The source's own bit statistics fell below the 0.25 gate.
    #[error("sample entropy estimate {observed:.4} below threshold 0.25")]
    LowSampleEntropy {
        /// Mean bit-occurrence probability reported by the source.
        observed: f64,
    },
    /// A partition of the drained bytes fell below the 0.25 gate.
    #[error("byte entropy estimate {observed:.4} below threshold 0.25 in partition {partition}")]
    LowByteEntropy {
        /// Mean byte-table probability of the failing partition.
        observed: f64,
        /// Index of the failing partition.
        partition: usize,
    },
    /// `copy_seed` was called before `generate_seed`.
    #[error("seed has not been generated")]
    SeedNotReady,
    /// More terms were requested than the digests can supply.
    #[error("requested {requested} seed terms but only {available} are available")]
    SeedExhausted {
        /// Terms requested by the caller.
        requested: usize,
        /// Terms the current digests can supply.
        available: usize,
    },
}

/// Integer types usable as seed terms.
///
/// Implemented for exactly the unsigned widths that divide a 64-byte
/// digest evenly: 1, 2, 4 and 8 bytes.
pub trait SeedTerm: Copy + Default {
    /// Bytes per term.
    const BYTES: usize;

    /// Shifts `byte` into the low end of the term (terms are grouped
    /// most-significant byte first).
    fn shift_in(self, byte: u8) -> Self;
}

impl SeedTerm for u8 {
    const BYTES: usize = 1;

    #[inline]
    fn shift_in(self, byte: u8) -> Self {
        byte
    }
}

macro_rules! impl_seed_term {
    ($($ty:ty),+) => {
        $(impl SeedTerm for $ty {
            const BYTES: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn shift_in(self, byte: u8) -> Self {
                (self << 8) | byte as $ty
            }
        })+
    };
}

impl_seed_term!(u16, u32, u64);

/// Threshold-gated entropy mixer producing seed terms from N parallel
/// rolling hashes.
///
/// Lifecycle: feed repeatedly via [`process_from_source`], finalise
/// once via [`generate_seed`], drain via [`copy_seed`] (which re-arms
/// the mixer), or discard via [`reset_state`].
///
/// [`process_from_source`]: SeedMixer::process_from_source
/// [`generate_seed`]: SeedMixer::generate_seed
/// [`copy_seed`]: SeedMixer::copy_seed
/// [`reset_state`]: SeedMixer::reset_state
pub struct SeedMixer {
    hashers: Vec<Sha3_512>,
    digests: Vec<[u8; DIGEST_SIZE]>,
    seed_ready: bool,
}

impl SeedMixer {
    /// Creates a mixer with `splits` independent hash partitions.
    ///
    /// # Panics
    ///
    /// Panics if `splits` is zero.
    pub fn new(splits: usize) -> Self {
        assert!(splits >= 1, "split count must be at least 1");
        Self {
            hashers: (0..splits).map(|_| Sha3_512::new()).collect(),
            digests: Vec::with_capacity(splits),
            seed_ready: false,
        }
    }

    /// Drains `source` and absorbs its bytes into the rolling hashes,
    /// provided both quality gates pass.
    ///
    /// On [`MixerError::LowByteEntropy`] the partitions before the
    /// failing one have already absorbed their slices; callers treat
    /// the failure as fatal for the current mix or call
    /// [`reset_state`](SeedMixer::reset_state).
    pub fn process_from_source(
        &mut self,
        source: &mut dyn RandomSource,
    ) -> Result<(), MixerError> {
        if self.seed_ready {
            return Err(MixerError::SeedLocked);
        }

        let probs = source.bit_entropy();
        let observed = if probs.is_empty() {
            0.0
        } else {
            probs.iter().sum::<f64>() / probs.len() as f64
        };
        if observed < ENTROPY_THRESHOLD {
            tracing::warn!(observed, "sample entropy estimate low");
            return Err(MixerError::LowSampleEntropy { observed });
        }

        let mut data = Vec::new();
        source.append_data(&mut data);

        let splits = self.hashers.len();
        let step = data.len() / splits;

        for (partition, hasher) in self.hashers.iter_mut().enumerate() {
            // The last partition also absorbs the remainder bytes.
            let slice = if partition == splits - 1 {
                &data[partition * step..]
            } else {
                &data[partition * step..(partition + 1) * step]
            };

            let observed = byte_entropy(slice);
            if observed <= ENTROPY_THRESHOLD {
                tracing::warn!(partition, observed, "byte entropy estimate low");
                return Err(MixerError::LowByteEntropy {
                    observed,
                    partition,
                });
            }
            hasher.update(slice);
        }

        tracing::debug!(bytes = data.len(), splits, "entropy absorbed");
        Ok(())
    }

    /// Finalises the rolling hashes into the seed digests. Idempotent;
    /// no more data is accepted until the seed is copied or reset.
    pub fn generate_seed(&mut self) {
        if self.seed_ready {
            return;
        }

        self.digests = self
            .hashers
            .iter_mut()
            .map(|hasher| {
                let mut digest = [0u8; DIGEST_SIZE];
                digest.copy_from_slice(&hasher.finalize_reset());
                digest
            })
            .collect();
        self.seed_ready = true;
    }

    /// Fills `dst` with seed terms, grouping digest bytes
    /// most-significant first across the partitions in order.
    ///
    /// Requires a generated seed and refuses (leaving the seed intact)
    /// when `dst` asks for more terms than the digests hold. A
    /// successful copy re-arms the mixer for new input.
    pub fn copy_seed<T: SeedTerm>(&mut self, dst: &mut [T]) -> Result<(), MixerError> {
        if !self.seed_ready {
            return Err(MixerError::SeedNotReady);
        }

        let per_digest = DIGEST_SIZE / T::BYTES;
        let available = per_digest * self.digests.len();
        if dst.len() > available {
            return Err(MixerError::SeedExhausted {
                requested: dst.len(),
                available,
            });
        }

        let mut slots = dst.iter_mut();
        'digests: for digest in &self.digests {
            for group in digest.chunks_exact(T::BYTES) {
                match slots.next() {
                    Some(slot) => {
                        *slot = group
                            .iter()
                            .fold(T::default(), |term, &byte| term.shift_in(byte));
                    }
                    None => break 'digests,
                }
            }
        }

        self.seed_ready = false;
        Ok(())
    }

    /// Discards any pending seed and restarts the rolling hashes,
    /// making the mixer ready for a fresh round of input.
    pub fn reset_state(&mut self) {
        for hasher in &mut self.hashers {
            *hasher = Sha3_512::new();
        }
        self.digests.clear();
        self.seed_ready = false;
    }

    /// Returns true once `generate_seed` has run and the seed has not
    /// yet been copied or reset.
    #[inline]
    pub fn seed_ready(&self) -> bool {
        self.seed_ready
    }

    /// Number of hash partitions.
    #[inline]
    pub fn splits(&self) -> usize {
        self.hashers.len()
    }
}

/// Mean bit-occurrence probability of a byte slice via the static
/// popcount table. Empty slices rate 0.0.
fn byte_entropy(slice: &[u8]) -> f64 {
    if slice.is_empty() {
        return 0.0;
    }
    let sum: f64 = slice.iter().map(|&b| BYTE_BIT_PROBS[b as usize]).sum();
    sum / slice.len() as f64
}
