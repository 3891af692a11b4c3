use crate::keys::{self, SECRET_LENGTH};
use crate::search::SearchState;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use rand::RngCore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use zeroize::Zeroize;

/// Secrets drawn from the random source per call.
pub(crate) const BATCH_SIZE: usize = 16;

/// Worker loop: pull a batch of random secrets in one call, derive each
/// candidate address and test it against the pattern. The shared flags are
/// polled at the top of each batch and between candidates; the first
/// matching worker records the result and everyone else exits on the flag.
pub(crate) fn run(state: Arc<SearchState>, thread_id: usize) {
    let secp = Secp256k1::new();
    let mut rng = rand::thread_rng();
    let mut pool = [0u8; SECRET_LENGTH * BATCH_SIZE];

    while !state.should_stop() {
        if let Err(e) = rng.try_fill_bytes(&mut pool) {
            // Losing the random source ends this worker; peers continue.
            eprintln!("worker {thread_id}: random source failed: {e}");
            break;
        }

        for chunk in pool.chunks_exact(SECRET_LENGTH) {
            if state.should_stop() {
                break;
            }

            // Secrets outside the curve order are skipped, not fatal.
            let Ok(key) = SecretKey::from_slice(chunk) else {
                continue;
            };
            let address = keys::derive_p2pkh(&secp, &key, true, state.network);

            state.stats.attempts.fetch_add(1, Ordering::SeqCst);

            // The leading version character is not part of the match.
            if state.pattern.matches(&address[1..]) {
                state.record_win(chunk, true, &address);
                break;
            }
        }

        state.emit_progress();
    }

    pool.zeroize();
}
