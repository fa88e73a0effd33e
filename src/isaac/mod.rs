//! The ISAAC stream generator and its persistent state.
//!
//! ISAAC ("Indirection, Shift, Accumulate, Add, Count") is Jenkins'
//! array-based generator. This is the 32-bit variant with ALPHA = 8:
//! a 256-word result array, a 256-word memory array and three
//! accumulator registers, giving an expected period above 2^8295.
//!
//! On top of the stock construction sits a persistence layer: the
//! engine carries a state-file identifier and an optional key, can
//! flush its full internal state through the vault and resume from it
//! later.

mod engine;
mod state;

pub use engine::{IsaacEngine, LoadError, DEFAULT_STATE_PATH};

/// log2 of the state size.
pub const ALPHA: usize = 8;

/// Words in each of the result and memory arrays (2^ALPHA).
pub const STATE_WORDS: usize = 1 << ALPHA;
