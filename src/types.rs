use crate::keys::Secret;
use crate::pattern::{Combinator, PatternKind};
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64};

/// Parsed `btk vanity` invocation: what to search for and how.
#[derive(Debug, Clone)]
pub struct VanityConfig {
    pub patterns: Vec<String>,
    pub kind: PatternKind,
    pub combinator: Option<Combinator>,
    pub case_sensitive: bool,
    pub threads: usize,
    pub benchmark: bool,
    pub network: Network,
}

/// The winning candidate: its secret and the derived address.
#[derive(Debug)]
pub struct Winner {
    pub secret: Secret,
    pub address: String,
}

/// Counters and flags shared by every worker thread. Atomics keep the hot
/// path lock-free; `attempts` is incremented and read sequentially
/// consistent so progress readings never decrease.
pub struct SearchStats {
    pub found: AtomicBool,
    pub stopped: AtomicBool,
    pub attempts: AtomicU64,
}

impl SearchStats {
    pub fn new() -> Self {
        Self {
            found: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
        }
    }
}

impl Default for SearchStats {
    fn default() -> Self {
        Self::new()
    }
}

/// One benchmark sample. Persists as JSON so repeated runs can skip the
/// measurement when a recent result exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub thread_count: usize,
    pub total_keys: u64,
    pub keys_per_second: u64,
    pub elapsed_seconds: f64,
    pub cpu_percent: f64,
    pub peak_memory_bytes: u64,
    pub timestamp: u64,
    pub platform: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_search_stats_initialization() {
        let stats = SearchStats::new();
        assert!(!stats.found.load(Ordering::SeqCst));
        assert!(!stats.stopped.load(Ordering::SeqCst));
        assert_eq!(stats.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_search_stats_concurrent_counting() {
        let stats = Arc::new(SearchStats::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.attempts.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.attempts.load(Ordering::SeqCst), 400);
    }

    #[test]
    fn test_search_stats_flags() {
        let stats = SearchStats::new();
        stats.stopped.store(true, Ordering::SeqCst);
        assert!(stats.stopped.load(Ordering::SeqCst));
        assert!(!stats.found.load(Ordering::SeqCst));
    }

    #[test]
    fn test_benchmark_result_serialization() {
        let result = BenchmarkResult {
            thread_count: 8,
            total_keys: 123_456,
            keys_per_second: 15_432,
            elapsed_seconds: 8.0,
            cpu_percent: 770.5,
            peak_memory_bytes: 12 * 1024 * 1024,
            timestamp: 1_700_000_000,
            platform: "x86_64 - 8 cores".to_string(),
        };

        let json = serde_json::to_string_pretty(&result).unwrap();
        assert!(json.contains("keys_per_second"));
        assert!(json.contains("15432"));

        let back: BenchmarkResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_vanity_config_debug() {
        let config = VanityConfig {
            patterns: vec!["abc".to_string()],
            kind: PatternKind::Prefix,
            combinator: None,
            case_sensitive: true,
            threads: 4,
            benchmark: false,
            network: Network::Bitcoin,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("VanityConfig"));
        assert!(debug.contains("abc"));
        assert!(debug.contains("Prefix"));
    }
}
