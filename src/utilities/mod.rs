/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// utilities module
//
// random number plumbing shared across the app
//
////////////////////////////////////////////////////////////////////////////////////

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Generator for one trial.  Every trial reads its own ChaCha stream of the
/// master seed, so trials never share generator state and a seed reproduces
/// the whole ensemble whatever order the trials run in.
pub fn trial_rng(master_seed: u64, trial: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(master_seed);
    rng.set_stream(trial as u64);
    rng
}

// master seed for the n-th ensemble of a multi-ensemble run
pub fn derived_seed(master_seed: u64, index: usize) -> u64 {
    master_seed ^ (index as u64).wrapping_mul(SEED_MIX)
}

pub fn fresh_seed() -> u64 {
    thread_rng().gen()
}
