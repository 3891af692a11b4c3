use crate::keys::{self, KeyError, Secret};
use crate::pattern::{Pattern, PatternError, PatternKind};
use crate::types::{SearchStats, Winner};
use crate::worker;
use bitcoin::Network;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest pattern text the coordinator compiles on its own.
pub const MAX_PATTERN_TEXT: usize = 16;
/// Worker thread count bounds.
pub const MAX_THREADS: usize = 64;

/// Errors from the search coordinator.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("pattern exceeds {MAX_PATTERN_TEXT} characters")]
    PatternTooLong,
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("thread count {0} is outside 1..={MAX_THREADS}")]
    BadThreadCount(usize),
    #[error("search already started")]
    AlreadyStarted,
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
    #[error("no match has been found")]
    NoMatch,
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Progress observer: receives (total attempts, keys per second).
pub type ProgressFn = Box<dyn Fn(u64, f64) + Send + Sync + 'static>;

pub(crate) struct ProgressHook {
    pub(crate) callback: ProgressFn,
    pub(crate) interval: Duration,
}

/// Everything guarded by the one coordinator mutex: the single-writer
/// result slot and the progress pacing timestamp.
pub(crate) struct Shared {
    pub(crate) winner: Option<Winner>,
    pub(crate) last_progress: Instant,
}

/// State shared between the coordinator and its workers. The pattern and
/// network are immutable once workers hold a reference.
pub(crate) struct SearchState {
    pub(crate) pattern: Pattern,
    pub(crate) network: Network,
    pub(crate) stats: SearchStats,
    pub(crate) shared: Mutex<Shared>,
    pub(crate) progress: Option<ProgressHook>,
}

impl SearchState {
    pub(crate) fn should_stop(&self) -> bool {
        self.stats.found.load(Ordering::SeqCst) || self.stats.stopped.load(Ordering::SeqCst)
    }

    /// First writer wins. Whoever holds the mutex while `found` is still
    /// unset records the result; everyone else drops out on the flag.
    pub(crate) fn record_win(&self, secret_bytes: &[u8], compressed: bool, address: &str) {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.stats.found.load(Ordering::SeqCst) {
            if let Ok(secret) = Secret::from_slice(secret_bytes, compressed) {
                shared.winner = Some(Winner {
                    secret,
                    address: address.to_string(),
                });
                self.stats.found.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Invokes the progress callback when the configured interval has
    /// elapsed. The callback runs with the mutex held and must not block
    /// or re-enter the coordinator.
    pub(crate) fn emit_progress(&self) {
        let Some(hook) = &self.progress else {
            return;
        };
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = shared.last_progress.elapsed();
        if elapsed >= hook.interval {
            let attempts = self.stats.attempts.load(Ordering::SeqCst);
            let elapsed_ms = (elapsed.as_millis().max(1)) as f64;
            let rate = attempts as f64 * 1000.0 / elapsed_ms;
            (hook.callback)(attempts, rate);
            shared.last_progress = Instant::now();
        }
    }
}

/// Coordinates a multi-threaded vanity address search: owns the shared
/// state, spawns and joins workers, and exposes the winning result.
pub struct VanitySearch {
    state: Arc<SearchState>,
    workers: Vec<JoinHandle<()>>,
    thread_count: usize,
    started_at: Option<Instant>,
}

impl VanitySearch {
    /// Builds a search around an already-compiled pattern.
    pub fn new(pattern: Pattern, threads: usize) -> Result<Self, SearchError> {
        if threads < 1 || threads > MAX_THREADS {
            return Err(SearchError::BadThreadCount(threads));
        }
        Ok(Self {
            state: Arc::new(SearchState {
                pattern,
                network: keys::current_network(),
                stats: SearchStats::new(),
                shared: Mutex::new(Shared {
                    winner: None,
                    last_progress: Instant::now(),
                }),
                progress: None,
            }),
            workers: Vec::with_capacity(threads),
            thread_count: threads,
            started_at: None,
        })
    }

    /// Compiles `text` as a prefix pattern and builds a search for it.
    pub fn with_prefix(
        text: &str,
        case_sensitive: bool,
        threads: usize,
    ) -> Result<Self, SearchError> {
        if text.len() > MAX_PATTERN_TEXT {
            return Err(SearchError::PatternTooLong);
        }
        let pattern = Pattern::compile(text, PatternKind::Prefix, case_sensitive)?;
        Self::new(pattern, threads)
    }

    /// Overrides the network. Only valid before `start`.
    pub fn set_network(&mut self, network: Network) -> Result<(), SearchError> {
        let state = Arc::get_mut(&mut self.state).ok_or(SearchError::AlreadyStarted)?;
        state.network = network;
        Ok(())
    }

    /// Installs the progress callback. Only valid before `start`; an
    /// interval of zero fires on every progress check.
    pub fn set_progress_callback<F>(
        &mut self,
        interval_ms: u64,
        callback: F,
    ) -> Result<(), SearchError>
    where
        F: Fn(u64, f64) + Send + Sync + 'static,
    {
        let state = Arc::get_mut(&mut self.state).ok_or(SearchError::AlreadyStarted)?;
        state.progress = Some(ProgressHook {
            callback: Box::new(callback),
            interval: Duration::from_millis(interval_ms),
        });
        Ok(())
    }

    /// Spawns the worker threads. If any spawn fails, the workers already
    /// running are stopped and joined before the error is returned.
    pub fn start(&mut self) -> Result<(), SearchError> {
        if self.started_at.is_some() {
            return Err(SearchError::AlreadyStarted);
        }
        self.started_at = Some(Instant::now());
        {
            let mut shared = self
                .state
                .shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            shared.last_progress = Instant::now();
        }

        for id in 0..self.thread_count {
            let state = Arc::clone(&self.state);
            let spawned = thread::Builder::new()
                .name(format!("vanity-worker-{id}"))
                .spawn(move || worker::run(state, id));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    self.stop();
                    return Err(SearchError::Spawn(e));
                }
            }
        }
        Ok(())
    }

    /// Signals workers to stop and joins them. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.state.stats.stopped.store(true, Ordering::SeqCst);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn is_found(&self) -> bool {
        self.state.stats.found.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stats.stopped.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u64 {
        self.state.stats.attempts.load(Ordering::SeqCst)
    }

    /// Milliseconds since `start`; zero before the search begins.
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|at| at.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// True while at least one worker thread is still running.
    pub fn workers_running(&self) -> bool {
        self.workers.iter().any(|handle| !handle.is_finished())
    }

    pub fn pattern(&self) -> &Pattern {
        &self.state.pattern
    }

    pub fn network(&self) -> Network {
        self.state.network
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// WIF encoding of the winning secret. Fails until a match exists.
    pub fn wif(&self) -> Result<String, SearchError> {
        let shared = self.state.shared.lock().unwrap_or_else(PoisonError::into_inner);
        let winner = shared.winner.as_ref().ok_or(SearchError::NoMatch)?;
        Ok(winner.secret.to_wif(self.state.network)?)
    }

    /// Address of the winning candidate. Fails until a match exists.
    pub fn address(&self) -> Result<String, SearchError> {
        let shared = self.state.shared.lock().unwrap_or_else(PoisonError::into_inner);
        let winner = shared.winner.as_ref().ok_or(SearchError::NoMatch)?;
        Ok(winner.address.clone())
    }
}

impl Drop for VanitySearch {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::key::PrivateKey;
    use bitcoin::secp256k1::Secp256k1;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_thread_count_bounds() {
        let ok = |threads| VanitySearch::with_prefix("1", true, threads);
        assert!(matches!(ok(0), Err(SearchError::BadThreadCount(0))));
        assert!(matches!(ok(65), Err(SearchError::BadThreadCount(65))));
        assert!(ok(1).is_ok());
        assert!(ok(64).is_ok());
    }

    #[test]
    fn test_pattern_text_bounds() {
        let at_limit = "a".repeat(MAX_PATTERN_TEXT);
        assert!(VanitySearch::with_prefix(&at_limit, true, 1).is_ok());

        let over = "a".repeat(MAX_PATTERN_TEXT + 1);
        assert!(matches!(
            VanitySearch::with_prefix(&over, true, 1),
            Err(SearchError::PatternTooLong)
        ));
    }

    #[test]
    fn test_getters_before_start() {
        let search = VanitySearch::with_prefix("1", true, 2).unwrap();
        assert!(!search.is_found());
        assert!(!search.is_stopped());
        assert_eq!(search.attempts(), 0);
        assert_eq!(search.elapsed_ms(), 0);
        assert_eq!(search.thread_count(), 2);
        assert_eq!(search.network(), Network::Bitcoin);
        assert!(!search.workers_running());
        assert!(matches!(search.wif(), Err(SearchError::NoMatch)));
        assert!(matches!(search.address(), Err(SearchError::NoMatch)));
    }

    #[test]
    fn test_set_network_before_start_only() {
        let mut search = VanitySearch::with_prefix("1", true, 1).unwrap();
        search.set_network(Network::Testnet).unwrap();
        assert_eq!(search.network(), Network::Testnet);

        let mut started = VanitySearch::with_prefix("zzzzz", true, 1).unwrap();
        started.start().unwrap();
        assert!(matches!(
            started.set_network(Network::Testnet),
            Err(SearchError::AlreadyStarted)
        ));
        started.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut search = VanitySearch::with_prefix("1", true, 2).unwrap();
        search.stop();
        search.stop();
        assert!(search.is_stopped());
    }

    #[test]
    fn test_callback_rejected_after_start() {
        let mut search = VanitySearch::with_prefix("zzzzz", true, 1).unwrap();
        search.start().unwrap();
        let result = search.set_progress_callback(100, |_, _| {});
        assert!(matches!(result, Err(SearchError::AlreadyStarted)));
        search.stop();
    }

    #[test]
    fn test_single_winner() {
        let search = VanitySearch::with_prefix("1", true, 1).unwrap();
        let bytes_a = {
            let mut b = [0u8; 32];
            b[31] = 1;
            b
        };
        let bytes_b = {
            let mut b = [0u8; 32];
            b[31] = 2;
            b
        };

        search.state.record_win(&bytes_a, true, "1first");
        search.state.record_win(&bytes_b, true, "1second");

        assert!(search.is_found());
        assert_eq!(search.address().unwrap(), "1first");
    }

    #[test]
    fn test_progress_callback_fires() {
        // A pattern that never matches a base58 address keeps the run alive.
        let mut search = VanitySearch::with_prefix("0", true, 2).unwrap();
        let ticks = Arc::new(AtomicU64::new(0));
        {
            let ticks = Arc::clone(&ticks);
            search
                .set_progress_callback(0, move |attempts, rate| {
                    assert!(rate >= 0.0);
                    let _ = attempts;
                    ticks.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        search.start().unwrap();
        thread::sleep(Duration::from_millis(300));
        search.stop();

        assert!(ticks.load(Ordering::SeqCst) > 0);
        assert!(!search.is_found());
    }

    #[test]
    fn test_attempts_monotonic() {
        let mut search = VanitySearch::with_prefix("0", true, 2).unwrap();
        search.start().unwrap();

        let mut previous = 0;
        for _ in 0..10 {
            thread::sleep(Duration::from_millis(20));
            let now = search.attempts();
            assert!(now >= previous);
            previous = now;
        }
        search.stop();
        assert!(search.attempts() > 0);
    }

    #[test]
    fn test_search_finds_prefix_end_to_end() {
        let mut search = VanitySearch::with_prefix("1", true, 2).unwrap();
        search.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        while !search.is_found() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        search.stop();
        assert!(search.is_found(), "no match within the allotted time");

        let address = search.address().unwrap();
        assert!(address.starts_with('1'));
        assert_eq!(address.as_bytes()[1], b'1');
        assert!((26..=34).contains(&address.len()));

        // The stored pattern re-accepts the stored address post-strip.
        assert!(search.pattern().matches(&address[1..]));

        // The winner is reproducible from its WIF-encoded key.
        let wif = search.wif().unwrap();
        let decoded = PrivateKey::from_wif(&wif).unwrap();
        assert!(decoded.compressed);
        let secp = Secp256k1::new();
        let derived = crate::keys::derive_p2pkh(
            &secp,
            &decoded.inner,
            decoded.compressed,
            Network::Bitcoin,
        );
        assert_eq!(derived, address);

        // Workers are fully joined after stop.
        assert!(!search.workers_running());
    }
}
