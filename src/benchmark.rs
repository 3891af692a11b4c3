use crate::pattern::{Pattern, PatternKind};
use crate::search::{SearchError, VanitySearch};
use crate::types::BenchmarkResult;
use crate::utils::format_duration;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Prefix that can never match: `0` is not a base58 character, so the
/// throughput probe runs for the full duration without finding anything.
const PROBE_PATTERN: &str = "0000000000000000";
/// How often the probe samples the rate.
const PROBE_INTERVAL_MS: u64 = 1000;

/// Where benchmark results are cached between runs.
const CACHE_FILE: &str = "btk-benchmark.json";
/// Thermal state and system load drift, so cached results expire.
const CACHE_VALIDITY_SECS: u64 = 12 * 3600;

/// Measures raw key-search throughput by driving a full search at a
/// never-matching pattern for `duration`, then reading the wall clock and
/// rusage deltas.
pub fn run(duration: Duration, thread_count: usize) -> Result<BenchmarkResult, SearchError> {
    let probe = Pattern::compile(PROBE_PATTERN, PatternKind::Prefix, true)?;
    let mut search = VanitySearch::new(probe, thread_count)?;

    let observed = Arc::new(Mutex::new(0f64));
    {
        let observed = Arc::clone(&observed);
        search.set_progress_callback(PROBE_INTERVAL_MS, move |_attempts, rate| {
            let mut slot = observed.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = rate;
        })?;
    }

    let started = Instant::now();
    let (cpu_start, _) = resource_usage();
    search.start()?;
    thread::sleep(duration);
    search.stop();
    let elapsed_seconds = started.elapsed().as_secs_f64();
    let (cpu_end, peak_memory_bytes) = resource_usage();

    let total_keys = search.attempts();
    let observed_rate = *observed.lock().unwrap_or_else(PoisonError::into_inner);
    // Short runs may end before the first progress tick; fall back to the
    // average rate so the result always carries a throughput figure.
    let keys_per_second = if observed_rate > 0.0 {
        observed_rate as u64
    } else if elapsed_seconds > 0.0 {
        (total_keys as f64 / elapsed_seconds) as u64
    } else {
        0
    };

    let cpu_percent = if elapsed_seconds > 0.0 {
        (cpu_end - cpu_start) / elapsed_seconds * 100.0
    } else {
        0.0
    };

    Ok(BenchmarkResult {
        thread_count,
        total_keys,
        keys_per_second,
        elapsed_seconds,
        cpu_percent,
        peak_memory_bytes,
        timestamp: unix_now(),
        platform: platform_info(),
    })
}

/// Expected seconds until a match at the measured per-thread rate. Zero
/// when the pattern probability is unknown or the rate is zero.
pub fn estimate_time(pattern: &Pattern, thread_count: usize, keys_per_second: u64) -> f64 {
    if keys_per_second == 0 || thread_count == 0 {
        return 0.0;
    }
    let probability = pattern.probability();
    if probability <= 0.0 {
        return 0.0;
    }
    (1.0 / probability) / (keys_per_second as f64 * thread_count as f64)
}

/// Prints a benchmark summary and the projected time to match the pattern.
pub fn print_results(result: &BenchmarkResult, pattern: &Pattern) {
    println!("\nBenchmark Results:");
    println!("----------------");
    println!("Pattern: {pattern}");
    println!("Threads: {}", result.thread_count);
    println!("Performance: {} keys/second", result.keys_per_second);
    println!("CPU Usage: {:.1}%", result.cpu_percent);
    println!(
        "Memory Usage: {:.1} MB",
        result.peak_memory_bytes as f64 / (1024.0 * 1024.0)
    );

    let estimate = estimate_time(pattern, result.thread_count, result.keys_per_second);
    if estimate > 0.0 {
        println!("Estimated time to match: {}", format_duration(estimate));
    }
    println!();
}

/// Reads the cached benchmark if present and not stale.
pub fn load_cache() -> Option<BenchmarkResult> {
    load_cache_from(Path::new(CACHE_FILE))
}

fn load_cache_from(path: &Path) -> Option<BenchmarkResult> {
    let contents = std::fs::read_to_string(path).ok()?;
    let result: BenchmarkResult = serde_json::from_str(&contents).ok()?;
    let age = unix_now().saturating_sub(result.timestamp);
    (age < CACHE_VALIDITY_SECS).then_some(result)
}

/// Persists a benchmark result for later runs.
pub fn save_cache(result: &BenchmarkResult) -> io::Result<()> {
    save_cache_to(Path::new(CACHE_FILE), result)
}

fn save_cache_to(path: &Path, result: &BenchmarkResult) -> io::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn platform_info() -> String {
    let cores = thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    format!("{} - {} cores", std::env::consts::ARCH, cores)
}

/// Process CPU seconds (user + system) and peak resident set size in bytes.
#[cfg(unix)]
fn resource_usage() -> (f64, u64) {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
        return (0.0, 0);
    }
    let cpu_seconds = usage.ru_utime.tv_sec as f64
        + usage.ru_utime.tv_usec as f64 / 1e6
        + usage.ru_stime.tv_sec as f64
        + usage.ru_stime.tv_usec as f64 / 1e6;
    // ru_maxrss is kilobytes on Linux and bytes on macOS.
    let maxrss = usage.ru_maxrss.max(0) as u64;
    let peak_bytes = if cfg!(target_os = "macos") {
        maxrss
    } else {
        maxrss * 1024
    };
    (cpu_seconds, peak_bytes)
}

#[cfg(not(unix))]
fn resource_usage() -> (f64, u64) {
    (0.0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(timestamp: u64) -> BenchmarkResult {
        BenchmarkResult {
            thread_count: 2,
            total_keys: 10_000,
            keys_per_second: 5_000,
            elapsed_seconds: 2.0,
            cpu_percent: 180.0,
            peak_memory_bytes: 8 * 1024 * 1024,
            timestamp,
            platform: platform_info(),
        }
    }

    #[test]
    fn test_estimate_time_zero_cases() {
        let pattern = Pattern::compile("1", PatternKind::Prefix, true).unwrap();
        assert_eq!(estimate_time(&pattern, 2, 0), 0.0);
        assert_eq!(estimate_time(&pattern, 0, 1000), 0.0);

        // Regex probability is unknown, so no estimate is produced.
        let regex = Pattern::compile("1.*", PatternKind::Regex, true).unwrap();
        assert_eq!(estimate_time(&regex, 2, 1000), 0.0);
    }

    #[test]
    fn test_estimate_time_scales() {
        let pattern = Pattern::compile("1", PatternKind::Prefix, true).unwrap();
        // 58 expected attempts over 1000 keys/s on 2 threads.
        let estimate = estimate_time(&pattern, 2, 1000);
        assert!((estimate - 58.0 / 2000.0).abs() < 1e-12);

        // Doubling the threads halves the estimate.
        let single = estimate_time(&pattern, 1, 1000);
        assert!((single / estimate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_probe_pattern_never_matches_base58() {
        let probe = Pattern::compile(PROBE_PATTERN, PatternKind::Prefix, true).unwrap();
        assert!(!probe.matches("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"));
        assert!(!probe.matches("111111111111111111111111111111111"));
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");

        let result = sample_result(unix_now());
        save_cache_to(&path, &result).unwrap();
        assert_eq!(load_cache_from(&path), Some(result));
    }

    #[test]
    fn test_cache_expires() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");

        let stale = sample_result(unix_now().saturating_sub(CACHE_VALIDITY_SECS + 60));
        save_cache_to(&path, &stale).unwrap();
        assert_eq!(load_cache_from(&path), None);
    }

    #[test]
    fn test_cache_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(&path, "{ not json }").unwrap();
        assert_eq!(load_cache_from(&path), None);

        assert_eq!(load_cache_from(&dir.path().join("missing.json")), None);
    }

    #[test]
    fn test_resource_usage_sane() {
        let (cpu, _memory) = resource_usage();
        assert!(cpu >= 0.0);
    }

    #[test]
    fn test_two_second_benchmark_run() {
        let result = run(Duration::from_secs(2), 2).unwrap();
        assert_eq!(result.thread_count, 2);
        assert!(result.total_keys > 0);
        assert!(result.keys_per_second > 0);
        assert!(
            result.elapsed_seconds >= 1.5 && result.elapsed_seconds <= 3.0,
            "elapsed {}",
            result.elapsed_seconds
        );

        let pattern = Pattern::compile("1", PatternKind::Prefix, true).unwrap();
        let estimate = estimate_time(&pattern, result.thread_count, result.keys_per_second);
        assert!(estimate.is_finite());
        assert!(estimate > 0.0);
    }
}
