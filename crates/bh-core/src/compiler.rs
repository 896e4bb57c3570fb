//! Pattern compilation
//!
//! Patterns are compiled case-insensitively without capture support. The regex
//! engine guarantees linear-time matching, and program size is capped so a
//! hostile pattern cannot exhaust memory at compile time either.

use regex::RegexBuilder;

use crate::store::{CompiledRule, RuleHandle, RuleStore};
use crate::types::{OriginId, RuleCategory};

/// Error type for pattern compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("invalid {category} regex \"{pattern}\" (DB ID {origin_id}): {reason}")]
    InvalidSyntax {
        category: RuleCategory,
        origin_id: OriginId,
        pattern: String,
        reason: String,
    },
    #[error("{category} regex \"{pattern}\" (DB ID {origin_id}) exceeds the size limit of {limit} bytes")]
    TooLarge {
        category: RuleCategory,
        origin_id: OriginId,
        pattern: String,
        limit: usize,
    },
}

impl CompileError {
    pub fn origin_id(&self) -> OriginId {
        match self {
            Self::InvalidSyntax { origin_id, .. } | Self::TooLarge { origin_id, .. } => *origin_id,
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            Self::InvalidSyntax { pattern, .. } | Self::TooLarge { pattern, .. } => pattern,
        }
    }
}

/// Resource bounds for compiled patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Upper bound on the compiled program size, in bytes.
    pub size_limit: usize,
    /// Upper bound on the lazy DFA cache, in bytes.
    pub dfa_size_limit: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            size_limit: 1 << 20,
            dfa_size_limit: 2 << 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternCompiler {
    options: CompilerOptions,
}

impl PatternCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Compile `pattern` and append it to `category` in `store`.
    ///
    /// A slot is consumed even when compilation fails: the rule is stored as
    /// unavailable so row positions and category counts stay aligned. The
    /// failure is logged once here; callers need not log it again.
    pub fn compile(
        &self,
        store: &mut RuleStore,
        category: RuleCategory,
        pattern: &str,
        origin_id: OriginId,
    ) -> Result<RuleHandle, CompileError> {
        let built = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(self.options.size_limit)
            .dfa_size_limit(self.options.dfa_size_limit)
            .build();

        match built {
            Ok(regex) => Ok(store.push(category, CompiledRule::compiled(pattern, regex, origin_id))),
            Err(err) => {
                store.push(category, CompiledRule::unavailable(pattern, origin_id));
                let err = match err {
                    regex::Error::CompiledTooBig(limit) => CompileError::TooLarge {
                        category,
                        origin_id,
                        pattern: pattern.to_string(),
                        limit,
                    },
                    other => CompileError::InvalidSyntax {
                        category,
                        origin_id,
                        pattern: pattern.to_string(),
                        reason: other.to_string(),
                    },
                };
                log::warn!("{err}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_appends_available_rule() {
        let mut store = RuleStore::new();
        let compiler = PatternCompiler::default();

        let handle = compiler
            .compile(&mut store, RuleCategory::Blacklist, "^ads\\.", OriginId(7))
            .expect("pattern should compile");

        let rule = store.get(handle).expect("handle should resolve");
        assert!(rule.is_available());
        assert_eq!(rule.pattern(), "^ads\\.");
        assert_eq!(rule.origin_id(), OriginId(7));
        assert_eq!(store.len(RuleCategory::Blacklist), 1);
    }

    #[test]
    fn test_compile_is_case_insensitive() {
        let mut store = RuleStore::new();
        let compiler = PatternCompiler::default();
        let handle = compiler
            .compile(&mut store, RuleCategory::Whitelist, "^ADS\\.example", OriginId(1))
            .expect("pattern should compile");

        assert!(store.get(handle).is_some_and(|r| r.is_match("ads.EXAMPLE.com")));
    }

    #[test]
    fn test_invalid_pattern_consumes_slot() {
        let mut store = RuleStore::new();
        let compiler = PatternCompiler::default();

        let err = compiler
            .compile(&mut store, RuleCategory::Blacklist, "(unclosed", OriginId(4))
            .unwrap_err();

        assert!(matches!(err, CompileError::InvalidSyntax { .. }));
        assert_eq!(err.origin_id(), OriginId(4));
        assert_eq!(store.len(RuleCategory::Blacklist), 1);

        let rule = &store.rules(RuleCategory::Blacklist)[0];
        assert!(!rule.is_available());
        assert_eq!(rule.pattern(), "(unclosed");
    }

    #[test]
    fn test_oversized_pattern_rejected() {
        let mut store = RuleStore::new();
        let compiler = PatternCompiler::new(CompilerOptions {
            size_limit: 64,
            ..CompilerOptions::default()
        });

        let err = compiler
            .compile(&mut store, RuleCategory::Blacklist, "\\w{1000}", OriginId(5))
            .unwrap_err();

        assert!(matches!(err, CompileError::TooLarge { limit: 64, .. }));
        assert!(!store.rules(RuleCategory::Blacklist)[0].is_available());
    }

    #[test]
    fn test_posix_classes_supported() {
        let mut store = RuleStore::new();
        let compiler = PatternCompiler::default();
        let handle = compiler
            .compile(&mut store, RuleCategory::Blacklist, "^[[:digit:]]+\\.tracker\\.", OriginId(2))
            .expect("pattern should compile");

        let rule = store.get(handle).expect("handle should resolve");
        assert!(rule.is_match("123.tracker.net"));
        assert!(!rule.is_match("abc.tracker.net"));
    }
}
