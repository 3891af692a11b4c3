use regex::RegexBuilder;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Base58 alphabet used by Bitcoin addresses. Excludes `0`, `O`, `I` and `l`.
pub const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Longest pattern text accepted by the compiler.
pub const MAX_PATTERN_LENGTH: usize = 64;
/// Most sub-patterns allowed in a multi-pattern.
pub const MAX_MULTI_PATTERNS: usize = 8;
/// Largest character class in an alternation pattern, one slot per base58 glyph.
pub const MAX_CLASS_SIZE: usize = 58;

const BASE58_LEN: f64 = 58.0;
/// Positional adjustment applied to contains-pattern probabilities. A
/// convention inherited with the probability model, not a measured value.
const CONTAINS_ADJUSTMENT: f64 = 0.1;

/// Errors reported by pattern compilation.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern cannot be empty")]
    Empty,
    #[error("pattern exceeds {MAX_PATTERN_LENGTH} characters")]
    TooLong,
    #[error("invalid regular expression")]
    InvalidRegex(#[source] regex::Error),
    #[error("alternation pattern has no character classes")]
    NoClasses,
    #[error("unterminated character class")]
    UnterminatedClass,
    #[error("character class exceeds {MAX_CLASS_SIZE} characters")]
    ClassTooLong,
    #[error("multi-pattern requires between 1 and {MAX_MULTI_PATTERNS} sub-patterns")]
    BadMultiCount,
    #[error("unknown pattern type '{0}'")]
    UnknownKind(String),
    #[error("unknown combinator '{0}'")]
    UnknownCombinator(String),
}

/// Pattern dialect selected on the command line with `-p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Prefix,
    Suffix,
    Contains,
    Exact,
    Regex,
    Wildcard,
    Alternation,
}

impl FromStr for PatternKind {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefix" => Ok(Self::Prefix),
            "suffix" => Ok(Self::Suffix),
            "contains" => Ok(Self::Contains),
            "exact" => Ok(Self::Exact),
            "regex" => Ok(Self::Regex),
            "wildcard" => Ok(Self::Wildcard),
            "alt" => Ok(Self::Alternation),
            other => Err(PatternError::UnknownKind(other.to_string())),
        }
    }
}

/// How the sub-patterns of a multi-pattern combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

impl FromStr for Combinator {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(PatternError::UnknownCombinator(other.to_string())),
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

/// One piece of a wildcard pattern: a literal run or a `*`.
#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Any,
}

/// Character class of an alternation pattern.
#[derive(Debug, Clone)]
struct CharClass {
    members: String,
}

#[derive(Debug)]
enum Matcher {
    Prefix(String),
    Suffix(String),
    Contains(String),
    Exact(String),
    Regex(regex::Regex),
    Wildcard(Vec<Segment>),
    Alternation(Vec<CharClass>),
    Multi {
        subs: Vec<Pattern>,
        combinator: Combinator,
    },
}

/// A compiled, immutable address pattern. Carries its match probability,
/// computed once at compile time and used only for time estimates.
#[derive(Debug)]
pub struct Pattern {
    matcher: Matcher,
    case_sensitive: bool,
    probability: f64,
}

impl Pattern {
    /// Compiles `text` under the given dialect.
    pub fn compile(
        text: &str,
        kind: PatternKind,
        case_sensitive: bool,
    ) -> Result<Self, PatternError> {
        if text.is_empty() {
            return Err(PatternError::Empty);
        }
        if text.len() > MAX_PATTERN_LENGTH {
            return Err(PatternError::TooLong);
        }

        let matcher = match kind {
            PatternKind::Prefix => Matcher::Prefix(text.to_string()),
            PatternKind::Suffix => Matcher::Suffix(text.to_string()),
            PatternKind::Contains => Matcher::Contains(text.to_string()),
            PatternKind::Exact => Matcher::Exact(text.to_string()),
            PatternKind::Regex => {
                let regex = RegexBuilder::new(text)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(PatternError::InvalidRegex)?;
                Matcher::Regex(regex)
            }
            PatternKind::Wildcard => Matcher::Wildcard(parse_segments(text)),
            PatternKind::Alternation => Matcher::Alternation(parse_classes(text)?),
        };

        let probability = matcher_probability(&matcher);
        Ok(Self {
            matcher,
            case_sensitive,
            probability,
        })
    }

    /// Compiles an alternation pattern such as `[AB][12]`.
    pub fn compile_alternation(text: &str, case_sensitive: bool) -> Result<Self, PatternError> {
        Self::compile(text, PatternKind::Alternation, case_sensitive)
    }

    /// Combines several texts into one pattern. Each sub-pattern matches as
    /// a substring; the combinator decides whether all or any must hold.
    pub fn compile_multi(
        texts: &[&str],
        combinator: Combinator,
        case_sensitive: bool,
    ) -> Result<Self, PatternError> {
        if texts.is_empty() || texts.len() > MAX_MULTI_PATTERNS {
            return Err(PatternError::BadMultiCount);
        }
        let subs = texts
            .iter()
            .map(|text| Self::compile(text, PatternKind::Contains, case_sensitive))
            .collect::<Result<Vec<_>, _>>()?;

        let matcher = Matcher::Multi { subs, combinator };
        let probability = matcher_probability(&matcher);
        Ok(Self {
            matcher,
            case_sensitive,
            probability,
        })
    }

    /// Tests a candidate string. Deterministic and side-effect free.
    pub fn matches(&self, candidate: &str) -> bool {
        let fold = !self.case_sensitive;
        let bytes = candidate.as_bytes();
        match &self.matcher {
            Matcher::Prefix(text) => starts_with(bytes, text.as_bytes(), fold),
            Matcher::Suffix(text) => ends_with(bytes, text.as_bytes(), fold),
            Matcher::Contains(text) => contains(bytes, text.as_bytes(), fold),
            Matcher::Exact(text) => {
                bytes.len() == text.len() && bytes_eq(bytes, text.as_bytes(), fold)
            }
            Matcher::Regex(regex) => regex.is_match(candidate),
            Matcher::Wildcard(segments) => match_wildcard(segments, bytes, fold),
            Matcher::Alternation(classes) => match_alternation(classes, bytes, fold),
            Matcher::Multi { subs, combinator } => match combinator {
                Combinator::And => subs.iter().all(|sub| sub.matches(candidate)),
                Combinator::Or => subs.iter().any(|sub| sub.matches(candidate)),
            },
        }
    }

    /// Estimated fraction of base58 strings this pattern accepts, in [0, 1].
    /// Zero for regex patterns, whose probability cannot be estimated.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            Matcher::Prefix(text) => write!(f, "Prefix: {text}"),
            Matcher::Suffix(text) => write!(f, "Suffix: {text}"),
            Matcher::Contains(text) => write!(f, "Contains: {text}"),
            Matcher::Exact(text) => write!(f, "Exact: {text}"),
            Matcher::Regex(_) => f.write_str("Regex pattern"),
            Matcher::Wildcard(_) => f.write_str("Wildcard pattern"),
            Matcher::Alternation(_) => f.write_str("Alternation pattern"),
            Matcher::Multi { combinator, .. } => write!(f, "Multi-pattern ({combinator})"),
        }
    }
}

/// Splits a wildcard pattern on `*`. Adjacent stars each keep their own
/// segment; empty literal runs between them are not emitted.
fn parse_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    for ch in text.chars() {
        if ch == '*' {
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Any);
        } else {
            literal.push(ch);
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Parses `[..]` groups out of an alternation pattern. Characters between
/// groups act as separators and carry no meaning of their own.
fn parse_classes(text: &str) -> Result<Vec<CharClass>, PatternError> {
    let mut classes = Vec::new();
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '[' {
            continue;
        }
        let mut members = String::new();
        loop {
            match chars.next() {
                Some(']') => break,
                Some(member) => {
                    if members.len() == MAX_CLASS_SIZE {
                        return Err(PatternError::ClassTooLong);
                    }
                    members.push(member);
                }
                None => return Err(PatternError::UnterminatedClass),
            }
        }
        classes.push(CharClass { members });
    }
    if classes.is_empty() {
        return Err(PatternError::NoClasses);
    }
    Ok(classes)
}

fn bytes_eq(a: &[u8], b: &[u8], fold: bool) -> bool {
    if fold {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

fn starts_with(s: &[u8], needle: &[u8], fold: bool) -> bool {
    s.len() >= needle.len() && bytes_eq(&s[..needle.len()], needle, fold)
}

fn ends_with(s: &[u8], needle: &[u8], fold: bool) -> bool {
    s.len() >= needle.len() && bytes_eq(&s[s.len() - needle.len()..], needle, fold)
}

fn contains(s: &[u8], needle: &[u8], fold: bool) -> bool {
    needle.len() <= s.len() && s.windows(needle.len()).any(|w| bytes_eq(w, needle, fold))
}

/// First occurrence of `needle` at or after `from`.
fn find_from(s: &[u8], from: usize, needle: &[u8], fold: bool) -> Option<usize> {
    s[from..]
        .windows(needle.len())
        .position(|w| bytes_eq(w, needle, fold))
        .map(|at| from + at)
}

/// Greedy left-to-right walk: literals must match in order, each `*` skips
/// to the next occurrence of the following literal, a trailing `*` accepts
/// the remainder. Without one, the candidate must be fully consumed.
fn match_wildcard(segments: &[Segment], s: &[u8], fold: bool) -> bool {
    let mut pos = 0;
    let mut i = 0;
    while i < segments.len() {
        match &segments[i] {
            Segment::Literal(lit) => {
                if !starts_with(&s[pos..], lit.as_bytes(), fold) {
                    return false;
                }
                pos += lit.len();
                i += 1;
            }
            Segment::Any => {
                // A run of consecutive stars skips like a single one.
                while i < segments.len() && matches!(segments[i], Segment::Any) {
                    i += 1;
                }
                if i == segments.len() {
                    return true;
                }
                let Segment::Literal(lit) = &segments[i] else {
                    return false;
                };
                match find_from(s, pos, lit.as_bytes(), fold) {
                    Some(at) => {
                        pos = at + lit.len();
                        i += 1;
                    }
                    None => return false,
                }
            }
        }
    }
    pos == s.len()
}

/// Each candidate position must belong to the class at the same index, and
/// the candidate length must equal the class count.
fn match_alternation(classes: &[CharClass], s: &[u8], fold: bool) -> bool {
    if s.len() != classes.len() {
        return false;
    }
    classes.iter().zip(s).all(|(class, &byte)| {
        class.members.bytes().any(|member| {
            if fold {
                member.eq_ignore_ascii_case(&byte)
            } else {
                member == byte
            }
        })
    })
}

fn per_char_probability(len: usize) -> f64 {
    (1.0 / BASE58_LEN).powi(len as i32)
}

fn matcher_probability(matcher: &Matcher) -> f64 {
    let raw = match matcher {
        Matcher::Prefix(text) | Matcher::Suffix(text) | Matcher::Exact(text) => {
            per_char_probability(text.len())
        }
        Matcher::Contains(text) => per_char_probability(text.len()) * CONTAINS_ADJUSTMENT,
        Matcher::Regex(_) => 0.0,
        Matcher::Wildcard(segments) => {
            let fixed: usize = segments
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(lit) => lit.len(),
                    Segment::Any => 0,
                })
                .sum();
            let stars = segments
                .iter()
                .filter(|segment| matches!(segment, Segment::Any))
                .count();
            per_char_probability(fixed) * 0.5f64.powi(stars as i32)
        }
        Matcher::Alternation(classes) => classes
            .iter()
            .map(|class| class.members.len() as f64 / BASE58_LEN)
            .product(),
        Matcher::Multi { subs, combinator } => match combinator {
            Combinator::And => subs.iter().map(|sub| sub.probability).product(),
            Combinator::Or => subs.iter().map(|sub| sub.probability).sum(),
        },
    };
    raw.clamp(0.0, 1.0)
}
