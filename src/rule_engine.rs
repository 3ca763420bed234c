use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::rules::{MatchType, Rule};

/// Label assigned to URLs no rule matches.
pub const GROUP_NOT_SET: &str = "(not set)";

/// URLs are truncated to this length in warning logs.
const LOGGED_URL_MAX_LEN: usize = 200;

/// Resource budget for compiling user-supplied regex patterns. The regex
/// engine runs in linear time, so the memory ceiling on the compiled
/// program is the knob that keeps a pathological pattern from starving
/// the process. Passed explicitly per compilation, never set globally.
#[derive(Debug, Clone, Copy)]
pub struct MatchLimits {
    pub size_limit: usize,
    pub dfa_size_limit: usize,
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self {
            size_limit: 256 * 1024,
            dfa_size_limit: 256 * 1024,
        }
    }
}

enum Matcher {
    Prefix(String),
    Regex(Regex),
    /// Pattern the engine rejected at compile time (budget exceeded or
    /// invalid syntax). Evaluates as a non-match so later rules still run.
    Rejected { pattern: String, error: String },
}

struct CompiledRule {
    idsite: i64,
    group_name: String,
    matcher: Matcher,
}

/// A site's rules compiled for repeated evaluation.
///
/// Rules must already be sorted by `(priority, idrule)`; the first rule
/// whose pattern matches wins. The engine holds no mutable state and is
/// safe to share across evaluations.
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    pub fn compile(rules: &[Rule], limits: MatchLimits) -> Self {
        let rules = rules
            .iter()
            .map(|rule| {
                let matcher = match rule.match_type {
                    MatchType::Prefix => Matcher::Prefix(rule.pattern.clone()),
                    MatchType::Regex => match compile_regex(&rule.pattern, limits) {
                        Ok(re) => Matcher::Regex(re),
                        Err(e) => Matcher::Rejected {
                            pattern: rule.pattern.clone(),
                            error: e.to_string(),
                        },
                    },
                };
                CompiledRule {
                    idsite: rule.idsite,
                    group_name: rule.group_name.clone(),
                    matcher,
                }
            })
            .collect();
        Self { rules }
    }

    /// Evaluate a URL against the compiled rules and return the matching
    /// group name, or [`GROUP_NOT_SET`] if no rule matches.
    ///
    /// Prefix rules compare raw bytes, case-sensitive, anchored at the
    /// start. Regex rules match anywhere in the URL. A rule whose pattern
    /// was rejected by the engine logs a warning and falls through to the
    /// next rule; evaluation never fails.
    pub fn evaluate_url(&self, url: &str) -> &str {
        for rule in &self.rules {
            match &rule.matcher {
                Matcher::Prefix(prefix) => {
                    if url.starts_with(prefix.as_str()) {
                        return &rule.group_name;
                    }
                }
                Matcher::Regex(re) => {
                    if re.is_match(url) {
                        return &rule.group_name;
                    }
                }
                Matcher::Rejected { pattern, error } => {
                    warn!(
                        idsite = rule.idsite,
                        pattern = truncate(pattern, LOGGED_URL_MAX_LEN),
                        url = truncate(url, LOGGED_URL_MAX_LEN),
                        "skipping rule, pattern rejected by regex engine: {}",
                        error
                    );
                }
            }
        }
        GROUP_NOT_SET
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Validate a pattern for use in a rule.
///
/// Prefix patterns are plain strings and always valid. Regex patterns must
/// pass the static ReDoS pre-check and compile within the default budget.
pub fn is_valid_pattern(pattern: &str, match_type: MatchType) -> bool {
    match match_type {
        MatchType::Prefix => true,
        MatchType::Regex => {
            !has_nested_quantifiers(pattern)
                && compile_regex(pattern, MatchLimits::default()).is_ok()
        }
    }
}

/// Detect the nested-quantifier shape behind catastrophic backtracking:
/// a quantified group itself followed by another quantifier, e.g. `(a+)+`,
/// `(\w*)+`, `(a+){2,}`. Deliberately conservative; it rejects some safe
/// patterns and does not catch alternation-based blowups, so it is paired
/// with the compile-time budget rather than relied on alone.
pub fn has_nested_quantifiers(pattern: &str) -> bool {
    static CHECK: OnceLock<Regex> = OnceLock::new();
    let check = CHECK.get_or_init(|| {
        Regex::new(r"\([^)]*[+*}?][^)]*\)\s*[+*?{]").expect("static pattern")
    });
    check.is_match(pattern)
}

fn compile_regex(pattern: &str, limits: MatchLimits) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .size_limit(limits.size_limit)
        .dfa_size_limit(limits.dfa_size_limit)
        .build()
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
