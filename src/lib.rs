//! Vanity address search for Bitcoin P2PKH addresses.
//!
//! Worker threads draw random secp256k1 secrets in batches, derive each
//! candidate's legacy address, and test it against a compiled pattern.
//! Patterns come in several dialects (prefix, suffix, contains, exact,
//! regex, wildcard, character-class alternation, and AND/OR combinations)
//! and carry a probability estimate that drives benchmark-based time
//! projections.

pub mod benchmark;
pub mod keys;
pub mod pattern;
pub mod search;
pub mod types;
pub mod utils;
pub mod vanity;
mod worker;
