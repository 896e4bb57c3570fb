//! Core Matching Engine
//!
//! This is the hot path - every DNS query goes through here.
//! Matching only reads the rule store and the enablement table.

use std::ops::ControlFlow;

use crate::enablement::ClientEnablement;
use crate::store::{RuleHandle, RuleStore};
use crate::types::{ClientScope, DebugFlags, MatchLimits, OriginId, RuleCategory, Verdict};

// =============================================================================
// Scan Policies
// =============================================================================

/// A rule that matched an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchHit {
    pub handle: RuleHandle,
    pub origin_id: OriginId,
}

impl MatchHit {
    #[inline]
    pub fn category(&self) -> RuleCategory {
        self.handle.category()
    }
}

/// Decides what a scan does with each match and what it returns.
pub trait ScanPolicy {
    type Output;

    /// Called for every matching rule in stored order.
    fn on_match(&mut self, hit: MatchHit) -> ControlFlow<()>;

    fn finish(self) -> Self::Output;
}

/// Stop at the first match. Stored order is the tie-break.
#[derive(Debug, Default)]
pub struct FirstMatch(Option<MatchHit>);

impl ScanPolicy for FirstMatch {
    type Output = Option<MatchHit>;

    #[inline]
    fn on_match(&mut self, hit: MatchHit) -> ControlFlow<()> {
        self.0 = Some(hit);
        ControlFlow::Break(())
    }

    fn finish(self) -> Self::Output {
        self.0
    }
}

/// Record every match and keep scanning.
#[derive(Debug, Default)]
pub struct CollectAll(Vec<MatchHit>);

impl ScanPolicy for CollectAll {
    type Output = Vec<MatchHit>;

    fn on_match(&mut self, hit: MatchHit) -> ControlFlow<()> {
        self.0.push(hit);
        ControlFlow::Continue(())
    }

    fn finish(self) -> Self::Output {
        self.0
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// The core matching engine.
#[derive(Debug, Clone, Copy)]
pub struct MatchEngine<'a> {
    store: &'a RuleStore,
    enablement: &'a ClientEnablement,
    limits: MatchLimits,
    debug: DebugFlags,
}

impl<'a> MatchEngine<'a> {
    pub fn new(store: &'a RuleStore, enablement: &'a ClientEnablement) -> Self {
        Self {
            store,
            enablement,
            limits: MatchLimits::default(),
            debug: DebugFlags::empty(),
        }
    }

    pub fn with_limits(mut self, limits: MatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }

    /// Evaluate `input` against every rule of `category` visible to `scope`.
    pub fn scan<P: ScanPolicy>(
        &self,
        input: &str,
        scope: ClientScope,
        category: RuleCategory,
        mut policy: P,
    ) -> P::Output {
        if !self.limits.admits(input) {
            log::debug!(
                "Input of {} bytes exceeds the limit of {} bytes, not checking {} regex",
                input.len(),
                self.limits.max_input_len,
                category
            );
            return policy.finish();
        }

        let verbose = self.debug.contains(DebugFlags::REGEX);
        let offset = self.store.offset(category);

        for (position, rule) in self.store.rules(category).iter().enumerate() {
            if !rule.is_available() {
                if verbose {
                    log::debug!(
                        "Regex {} ({}, DB ID {}) \"{}\" is NOT AVAILABLE",
                        category,
                        position,
                        rule.origin_id(),
                        rule.pattern()
                    );
                }
                continue;
            }

            if let ClientScope::Client(client) = scope {
                if !self.enablement.is_enabled(client, offset + position) {
                    if verbose {
                        log::debug!(
                            "Regex {} ({}, DB ID {}) \"{}\" NOT ENABLED for client {}",
                            category,
                            position,
                            rule.origin_id(),
                            rule.pattern(),
                            client
                        );
                    }
                    continue;
                }
            }

            if !rule.is_match(input) {
                if verbose {
                    log::debug!(
                        "Regex {} ({}, DB ID {}) NO match: \"{}\" vs. \"{}\"",
                        category,
                        position,
                        rule.origin_id(),
                        input,
                        rule.pattern()
                    );
                }
                continue;
            }

            if verbose {
                log::debug!(
                    "Regex {} ({}, DB ID {}) >> MATCH: \"{}\" vs. \"{}\"",
                    category,
                    position,
                    rule.origin_id(),
                    input,
                    rule.pattern()
                );
            }

            let Some(handle) = self.store.handle(category, position) else {
                continue;
            };
            let hit = MatchHit {
                handle,
                origin_id: rule.origin_id(),
            };
            if policy.on_match(hit).is_break() {
                break;
            }
        }

        policy.finish()
    }

    /// First matching rule of `category`, if any.
    pub fn first_hit(&self, input: &str, scope: ClientScope, category: RuleCategory) -> Option<MatchHit> {
        self.scan(input, scope, category, FirstMatch::default())
    }

    /// Origin id of the first matching rule of `category`, if any.
    #[inline]
    pub fn first_match(&self, input: &str, scope: ClientScope, category: RuleCategory) -> Option<OriginId> {
        self.first_hit(input, scope, category).map(|hit| hit.origin_id)
    }

    /// Every matching rule of `category`, in stored order.
    pub fn all_matches(&self, input: &str, scope: ClientScope, category: RuleCategory) -> Vec<MatchHit> {
        self.scan(input, scope, category, CollectAll::default())
    }

    /// Query-path decision: whitelist first, then blacklist.
    pub fn verdict(&self, input: &str, scope: ClientScope) -> Verdict {
        if let Some(id) = self.first_match(input, scope, RuleCategory::Whitelist) {
            return Verdict::Allowed(id);
        }
        match self.first_match(input, scope, RuleCategory::Blacklist) {
            Some(id) => Verdict::Blocked(id),
            None => Verdict::Pass,
        }
    }
}
