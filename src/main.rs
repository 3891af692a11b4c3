use anyhow::Result;
use btk_vanity::keys;
use btk_vanity::pattern::{Combinator, PatternKind};
use btk_vanity::types::VanityConfig;
use btk_vanity::vanity::run_vanity_search;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::process::ExitCode;

/// Main entry point: parses the command line and dispatches to the vanity
/// search front.
fn main() -> ExitCode {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("vanity", sub)) => match create_vanity_config(sub) {
            Ok(config) => match run_vanity_search(&config) {
                Ok(code) => ExitCode::from(code),
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    ExitCode::from(255)
                }
            },
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::from(255)
            }
        },
        _ => ExitCode::from(255),
    }
}

fn build_cli() -> Command {
    Command::new("btk")
        .version("0.1.0")
        .about("Bitcoin toolkit")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("vanity")
                .about("Search for a Bitcoin P2PKH address matching a pattern")
                .long_about(
                    "Brute-force searches for a private key whose P2PKH address \
                     matches the given pattern. The leading version character of \
                     the address is not part of the match.",
                )
                .arg(
                    Arg::new("pattern")
                        .help("Pattern(s) to search for")
                        .value_name("PATTERN")
                        .required(true)
                        .num_args(1..),
                )
                .arg(
                    Arg::new("case-insensitive")
                        .long("case-insensitive")
                        .short('i')
                        .action(ArgAction::SetTrue)
                        .help("Case insensitive pattern matching"),
                )
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .short('t')
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .help("Number of worker threads (default: online CPU count)"),
                )
                .arg(
                    Arg::new("type")
                        .long("type")
                        .short('p')
                        .value_name("TYPE")
                        .default_value("prefix")
                        .help("Pattern dialect: prefix, suffix, contains, exact, regex, wildcard, alt"),
                )
                .arg(
                    Arg::new("multi")
                        .long("multi")
                        .short('m')
                        .value_name("OP")
                        .help("Combine multiple patterns with 'and' or 'or'"),
                )
                .arg(
                    Arg::new("benchmark")
                        .long("benchmark")
                        .short('b')
                        .action(ArgAction::SetTrue)
                        .help("Run a benchmark first and confirm before searching"),
                ),
        )
}

/// Validates the parsed arguments and builds the search configuration.
fn create_vanity_config(matches: &ArgMatches) -> Result<VanityConfig> {
    let patterns: Vec<String> = matches
        .get_many::<String>("pattern")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if patterns.is_empty() {
        anyhow::bail!("At least one pattern is required");
    }

    let kind: PatternKind = matches
        .get_one::<String>("type")
        .map(String::as_str)
        .unwrap_or("prefix")
        .parse()?;

    let combinator = matches
        .get_one::<String>("multi")
        .map(|op| op.parse::<Combinator>())
        .transpose()?;

    if patterns.len() > 1 && combinator.is_none() {
        anyhow::bail!("Multiple patterns require -m and|or");
    }

    let threads = matches
        .get_one::<usize>("threads")
        .copied()
        .unwrap_or_else(default_thread_count);

    Ok(VanityConfig {
        patterns,
        kind,
        combinator,
        case_sensitive: !matches.get_flag("case-insensitive"),
        threads,
        benchmark: matches.get_flag("benchmark"),
        network: keys::current_network(),
    })
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vanity_matches(args: &[&str]) -> ArgMatches {
        let mut full = vec!["btk", "vanity"];
        full.extend_from_slice(args);
        let matches = build_cli().try_get_matches_from(full).unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        sub.clone()
    }

    #[test]
    fn test_create_vanity_config_defaults() {
        let config = create_vanity_config(&vanity_matches(&["abc"])).unwrap();
        assert_eq!(config.patterns, vec!["abc"]);
        assert_eq!(config.kind, PatternKind::Prefix);
        assert!(config.combinator.is_none());
        assert!(config.case_sensitive);
        assert!(!config.benchmark);
        assert!(config.threads >= 1);
    }

    #[test]
    fn test_create_vanity_config_flags() {
        let config =
            create_vanity_config(&vanity_matches(&["-i", "-t", "8", "-p", "suffix", "-b", "abc"]))
                .unwrap();
        assert!(!config.case_sensitive);
        assert_eq!(config.threads, 8);
        assert_eq!(config.kind, PatternKind::Suffix);
        assert!(config.benchmark);
    }

    #[test]
    fn test_create_vanity_config_multi() {
        let config =
            create_vanity_config(&vanity_matches(&["-m", "and", "ABC", "XYZ"])).unwrap();
        assert_eq!(config.patterns, vec!["ABC", "XYZ"]);
        assert_eq!(config.combinator, Some(Combinator::And));
    }

    #[test]
    fn test_multiple_patterns_require_combinator() {
        let result = create_vanity_config(&vanity_matches(&["ABC", "XYZ"]));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("-m"));
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let result = create_vanity_config(&vanity_matches(&["-p", "bogus", "abc"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_combinator_rejected() {
        let result = create_vanity_config(&vanity_matches(&["-m", "xor", "a", "b"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_pattern_is_required() {
        assert!(build_cli()
            .try_get_matches_from(["btk", "vanity"])
            .is_err());
    }
}
