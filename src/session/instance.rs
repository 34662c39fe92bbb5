//! Instance identities
//!
//! An instance id names one logical client tab across reconnects and
//! reloads: 25 characters from `[A-Za-z0-9]`.

use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of every instance id
pub const INSTANCE_ID_LEN: usize = 25;

/// Generate a fresh instance id
pub fn generate_instance_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INSTANCE_ID_LEN)
        .map(char::from)
        .collect()
}

/// True when `candidate` has the shape of an instance id
pub fn is_valid_instance_id(candidate: &str) -> bool {
    candidate.len() == INSTANCE_ID_LEN && candidate.bytes().all(|b| b.is_ascii_alphanumeric())
}
