//! Textual rewrites from Postgres dialect into something the backing engine
//! can run.
//!
//! Rules are applied in order. Some rules replace the whole query and stop
//! rewriting, the rest are regex substitutions applied one after another.
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

/// Query clients issue to list keywords for completion.
const KEYWORDS_QUERY: &str = "select string_agg(word, ',') from pg_catalog.pg_get_keywords()";

/// Identity tokens rewritten into calls to the functions of the same name.
const IDENTITY_FUNCS_PATTERN: &str =
    r"\b(current_catalog|current_schema|current_user|session_user|user)\b([^\(]|$)";

static IDENTITY_FUNCS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(IDENTITY_FUNCS_PATTERN).unwrap());
static REGCLASS_CAST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"::(regclass)").unwrap());
static SHOW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^SHOW (\w+)").unwrap());

static DEFAULT_REWRITER: Lazy<Rewriter> = Lazy::new(Rewriter::postgres);

#[derive(Debug, Clone)]
pub enum RewriteAction {
    /// Replace the whole query if it starts with the prefix.
    ReplaceIfPrefixed {
        prefix: &'static str,
        replacement: &'static str,
    },
    /// Replace the whole query if it contains the needle anywhere.
    ReplaceIfContains {
        needle: &'static str,
        replacement: &'static str,
    },
    /// Substitute every match of the pattern.
    Substitute {
        pattern: Regex,
        replacement: &'static str,
    },
}

/// A single named rewrite.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub name: &'static str,
    pub action: RewriteAction,
}

impl RewriteRule {
    /// Apply this rule.
    ///
    /// Returns the rewritten query and whether rewriting should stop.
    pub fn apply<'a>(&self, sql: &'a str) -> (Cow<'a, str>, bool) {
        match &self.action {
            RewriteAction::ReplaceIfPrefixed {
                prefix,
                replacement,
            } if sql.starts_with(prefix) => (Cow::Borrowed(*replacement), true),
            RewriteAction::ReplaceIfContains {
                needle,
                replacement,
            } if sql.contains(needle) => (Cow::Borrowed(*replacement), true),
            RewriteAction::Substitute {
                pattern,
                replacement,
            } => (pattern.replace_all(sql, *replacement), false),
            _ => (Cow::Borrowed(sql), false),
        }
    }
}

/// Ordered list of rewrite rules.
#[derive(Debug, Clone)]
pub struct Rewriter {
    rules: Vec<RewriteRule>,
}

impl Rewriter {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Rewriter { rules }
    }

    /// Rules for making Postgres clients work against SQLite.
    pub fn postgres() -> Self {
        let rules = vec![
            RewriteRule {
                name: "set",
                action: RewriteAction::ReplaceIfPrefixed {
                    prefix: "SET ",
                    replacement: "SELECT 'SET'",
                },
            },
            RewriteRule {
                name: "keywords",
                action: RewriteAction::ReplaceIfContains {
                    needle: KEYWORDS_QUERY,
                    replacement: "SELECT '' AS \"string_agg\" WHERE 1 = 2",
                },
            },
            RewriteRule {
                name: "identity_funcs",
                action: RewriteAction::Substitute {
                    pattern: IDENTITY_FUNCS_RE.clone(),
                    replacement: "${1}()${2}",
                },
            },
            RewriteRule {
                name: "regclass_cast",
                action: RewriteAction::Substitute {
                    pattern: REGCLASS_CAST_RE.clone(),
                    replacement: "",
                },
            },
            RewriteRule {
                name: "show",
                action: RewriteAction::Substitute {
                    pattern: SHOW_RE.clone(),
                    replacement: "SELECT show('${1}') AS \"${1}\"",
                },
            },
        ];
        Rewriter::new(rules)
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Rewrite a query, applying every rule in order.
    pub fn rewrite(&self, sql: &str) -> String {
        let mut out = sql.to_string();
        for rule in &self.rules {
            let (rewritten, stop) = rule.apply(&out);
            if stop || matches!(rewritten, Cow::Owned(_)) {
                let rewritten = rewritten.into_owned();
                debug!(rule = rule.name, from = %out, to = %rewritten, "rewrote query");
                out = rewritten;
            }
            if stop {
                break;
            }
        }
        out
    }
}

impl Default for Rewriter {
    fn default() -> Self {
        DEFAULT_REWRITER.clone()
    }
}
