//! Blackhole Core Library
//!
//! This crate provides the regex filtering engine of the Blackhole DNS
//! resolver: pattern compilation, compiled rule storage, per-client rule
//! enablement and domain matching.
//!
//! # Modules
//!
//! - `types`: Shared type definitions
//! - `compiler`: Pattern compilation into the rule store
//! - `store`: Compiled rules, generation-checked handles, flattened indices
//! - `enablement`: Per-client rule grants
//! - `matcher`: Core domain matching engine
//!
//! # Example
//!
//! ```
//! use bh_core::{ClientEnablement, ClientScope, OriginId, PatternCompiler, RuleCategory, RuleStore};
//! use bh_core::matcher::MatchEngine;
//!
//! let mut store = RuleStore::new();
//! PatternCompiler::default()
//!     .compile(&mut store, RuleCategory::Blacklist, r"^ads\.", OriginId(7))
//!     .unwrap();
//!
//! let enablement = ClientEnablement::new();
//! let engine = MatchEngine::new(&store, &enablement);
//! assert_eq!(
//!     engine.first_match("ads.example.com", ClientScope::All, RuleCategory::Blacklist),
//!     Some(OriginId(7))
//! );
//! ```

pub mod compiler;
pub mod enablement;
pub mod matcher;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use compiler::{CompileError, CompilerOptions, PatternCompiler};
pub use enablement::ClientEnablement;
pub use matcher::{CollectAll, FirstMatch, MatchEngine, MatchHit, ScanPolicy};
pub use store::{CompiledRule, Counters, RuleHandle, RuleStore};
pub use types::{
    ClientId, ClientScope, DebugFlags, MatchLimits, OriginId, RuleCategory, Verdict, CLI_ORIGIN_ID,
    MAX_DOMAIN_LEN,
};
