use crate::benchmark;
use crate::pattern::{Pattern, PatternError};
use crate::search::VanitySearch;
use crate::types::VanityConfig;
use crate::utils::{format_duration, format_large_number};
use anyhow::Result;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Where found keys are appended for later retrieval.
const KEY_FILE: &str = "btk-keys.txt";
/// How often the progress line is rewritten.
const PROGRESS_INTERVAL_MS: u64 = 100;
/// Wall time for a `-b` benchmark run.
const BENCHMARK_SECONDS: u64 = 5;
/// Poll step of the wait loop.
const POLL_MS: u64 = 100;

/// Compiles the configured pattern: a multi-pattern when a combinator was
/// given, the selected dialect over the single pattern otherwise.
pub fn compile_pattern(config: &VanityConfig) -> Result<Pattern, PatternError> {
    match config.combinator {
        Some(combinator) => {
            let texts: Vec<&str> = config.patterns.iter().map(String::as_str).collect();
            Pattern::compile_multi(&texts, combinator, config.case_sensitive)
        }
        None => Pattern::compile(&config.patterns[0], config.kind, config.case_sensitive),
    }
}

/// Appends a found key to the key file so an interrupted session keeps
/// everything it already produced.
pub fn save_found_key(path: &Path, wif: &str, address: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{wif}; {address}")?;
    Ok(())
}

/// Reads the benchmark confirmation. Anything but an explicit `n` proceeds.
fn confirm_proceed() -> io::Result<bool> {
    print!("Proceed with search? [Y/n] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(!matches!(line.trim(), "n" | "N"))
}

/// Runs the vanity search end to end and returns the process exit code:
/// 0 for a match, 1 when the search stops without one.
pub fn run_vanity_search(config: &VanityConfig) -> Result<u8> {
    let pattern = compile_pattern(config)?;
    let mut search = VanitySearch::new(pattern, config.threads)?;
    search.set_network(config.network)?;

    println!("Starting vanity address search...");
    println!("Pattern: {}", search.pattern());
    println!(
        "Case {}sensitive",
        if search.pattern().case_sensitive() { "" } else { "in" }
    );
    println!(
        "Using {} thread{}",
        search.thread_count(),
        if search.thread_count() > 1 { "s" } else { "" }
    );
    println!("Network: {}", search.network());

    let probability = search.pattern().probability();
    if probability > 0.0 {
        println!(
            "Match probability: 1 in {}",
            format_large_number((1.0 / probability) as u64)
        );
    }

    if config.benchmark {
        let result = benchmark::run(Duration::from_secs(BENCHMARK_SECONDS), search.thread_count())?;
        benchmark::print_results(&result, search.pattern());
        if let Err(e) = benchmark::save_cache(&result) {
            eprintln!("Failed to cache benchmark result: {e}");
        }
        if !confirm_proceed()? {
            return Ok(1);
        }
    } else if let Some(cached) = benchmark::load_cache() {
        let estimate =
            benchmark::estimate_time(search.pattern(), search.thread_count(), cached.keys_per_second);
        if estimate > 0.0 {
            println!("Estimated time to match: {}", format_duration(estimate));
        }
    }
    println!();

    search.set_progress_callback(PROGRESS_INTERVAL_MS, |attempts, rate| {
        print!("\rAttempts: {attempts} ({rate:.0}/s)");
        let _ = io::stdout().flush();
    })?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
    }

    search.start()?;
    while !search.is_found() && !interrupted.load(Ordering::SeqCst) && search.workers_running() {
        thread::sleep(Duration::from_millis(POLL_MS));
    }
    search.stop();
    println!();

    if search.is_found() {
        let wif = search.wif()?;
        let address = search.address()?;
        println!("Found matching address!");
        println!("Private key (WIF): {wif}");
        println!("Address: {address}");
        println!(
            "Attempts: {} in {}",
            format_large_number(search.attempts()),
            format_duration(search.elapsed_ms() as f64 / 1000.0)
        );
        if let Err(e) = save_found_key(Path::new(KEY_FILE), &wif, &address) {
            eprintln!("Failed to save key to {KEY_FILE}: {e}");
        } else {
            println!("Key saved to {KEY_FILE}");
        }
        Ok(0)
    } else if interrupted.load(Ordering::SeqCst) {
        println!("Search interrupted by user");
        Ok(1)
    } else {
        println!("Search terminated without a match");
        Ok(1)
    }
}
