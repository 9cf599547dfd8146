//! Extraction of liveness and round-trip time from `ping` output.
//!
//! Patterns are tried in a fixed order and the first match wins:
//!
//! 1. Per-reply latency, `time=14.1 ms` and its localized spellings
//!    (`tiempo=`, `zeit=`, `temps=`). `<` is accepted in place of `=`
//!    for sub-millisecond replies such as `time<1ms`.
//! 2. Summary lines, Windows `Average = 14ms` (and `Media`/`Promedio`/
//!    `Mittelwert`/`Moyenne`), then the Unix
//!    `rtt min/avg/max/mdev = a/b/c/d ms` line, whose average is taken.
//!
//! A reply counts as alive when a `ttl=<n>` marker is present or a latency
//! was parsed; some platforms print a time without a TTL token.

use regex::Regex;
use std::sync::OnceLock;

const NUMBER: &str = r"([0-9]+(?:[.,][0-9]+)?)";

const LATENCY_KEYWORDS: &[&str] = &["time", "tiempo", "zeit", "temps"];

const SUMMARY_KEYWORDS: &str = "average|media|promedio|mittelwert|moyenne";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedReply {
    pub alive: bool,
    pub rtt_ms: Option<f64>,
}

impl ParsedReply {
    pub const LOST: ParsedReply = ParsedReply {
        alive: false,
        rtt_ms: None,
    };
}

struct Patterns {
    latency: Vec<Regex>,
    summary: Vec<Regex>,
    ttl: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();

    PATTERNS.get_or_init(|| {
        let latency = LATENCY_KEYWORDS
            .iter()
            .map(|keyword| compile(&format!(r"(?i)\b{keyword}\s*[=<]\s*{NUMBER}\s*ms")))
            .collect();
        let summary = vec![
            compile(&format!(r"(?i)\b(?:{SUMMARY_KEYWORDS})\s*=\s*{NUMBER}\s*ms")),
            compile(r"(?i)\b(?:rtt|round-trip)\s+min/avg/max/[a-z]+\s*=\s*[0-9.]+/([0-9.]+)/"),
        ];
        Patterns {
            latency,
            summary,
            ttl: compile(r"(?i)\bttl\s*=\s*[0-9]+"),
        }
    })
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("failed to compile ping output pattern")
}

/// Parse merged stdout/stderr of one ping invocation. Never fails; text with
/// no recognizable token yields [`ParsedReply::LOST`].
pub fn parse_ping_output(text: &str) -> ParsedReply {
    if text.trim().is_empty() {
        return ParsedReply::LOST;
    }

    let patterns = patterns();
    let rtt_ms = first_number(&patterns.latency, text)
        .or_else(|| first_number(&patterns.summary, text));
    let alive = rtt_ms.is_some() || patterns.ttl.is_match(text);

    ParsedReply { alive, rtt_ms }
}

fn first_number(patterns: &[Regex], text: &str) -> Option<f64> {
    patterns.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        parse_number(caps.get(1)?.as_str())
    })
}

fn parse_number(token: &str) -> Option<f64> {
    token.replace(',', ".").parse::<f64>().ok()
}
