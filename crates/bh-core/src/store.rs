//! Compiled rule storage
//!
//! Rules of each category live in their own ordered sequence. Insertion order
//! is compilation order, which is also the tie-break order during matching.
//! The concatenation `[Blacklist][Whitelist][CliTest]` forms the flattened
//! index space used to join rules with per-client enablement.
//!
//! Every store carries a generation number. Handles are stamped with it, so a
//! handle kept across a reload resolves to nothing instead of to whatever rule
//! now occupies the same slot.

use regex::Regex;

use crate::types::{OriginId, RuleCategory};

// =============================================================================
// Compiled Rule
// =============================================================================

/// One pattern belonging to one category.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    raw_pattern: String,
    matcher: Option<Regex>,
    origin_id: OriginId,
}

impl CompiledRule {
    pub(crate) fn compiled(raw_pattern: &str, matcher: Regex, origin_id: OriginId) -> Self {
        Self {
            raw_pattern: raw_pattern.to_string(),
            matcher: Some(matcher),
            origin_id,
        }
    }

    pub(crate) fn unavailable(raw_pattern: &str, origin_id: OriginId) -> Self {
        Self {
            raw_pattern: raw_pattern.to_string(),
            matcher: None,
            origin_id,
        }
    }

    /// The pattern text as supplied by the operator.
    #[inline]
    pub fn pattern(&self) -> &str {
        &self.raw_pattern
    }

    #[inline]
    pub fn origin_id(&self) -> OriginId {
        self.origin_id
    }

    /// False if the pattern failed to compile. Such rules never match.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.matcher.is_some()
    }

    #[inline]
    pub(crate) fn is_match(&self, input: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(input))
    }
}

// =============================================================================
// Rule Handle
// =============================================================================

/// Generation-checked reference to a rule in a [`RuleStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleHandle {
    generation: u32,
    category: RuleCategory,
    position: u32,
}

impl RuleHandle {
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn category(&self) -> RuleCategory {
        self.category
    }

    /// Position of the rule within its category.
    #[inline]
    pub fn position(&self) -> usize {
        self.position as usize
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Snapshot of rule and client counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub rules: [usize; RuleCategory::COUNT],
    pub clients: usize,
}

impl Counters {
    #[inline]
    pub fn rules(&self, category: RuleCategory) -> usize {
        self.rules[category.index()]
    }
}

// =============================================================================
// Rule Store
// =============================================================================

#[derive(Debug, Default)]
pub struct RuleStore {
    generation: u32,
    rules: [Vec<CompiledRule>; RuleCategory::COUNT],
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store one generation ahead of this one.
    pub fn successor(&self) -> Self {
        Self {
            generation: self.generation.wrapping_add(1),
            rules: Default::default(),
        }
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Drop every rule and invalidate all outstanding handles.
    pub fn clear(&mut self) {
        for rules in &mut self.rules {
            *rules = Vec::new();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Reserve room for `additional` rules of `category`.
    pub fn reserve(&mut self, category: RuleCategory, additional: usize) {
        self.rules[category.index()].reserve_exact(additional);
    }

    pub(crate) fn push(&mut self, category: RuleCategory, rule: CompiledRule) -> RuleHandle {
        let rules = &mut self.rules[category.index()];
        let position = rules.len() as u32;
        rules.push(rule);
        RuleHandle {
            generation: self.generation,
            category,
            position,
        }
    }

    /// Number of rule slots in `category`, including unavailable ones.
    #[inline]
    pub fn len(&self, category: RuleCategory) -> usize {
        self.rules[category.index()].len()
    }

    pub fn total_len(&self) -> usize {
        self.rules.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(Vec::is_empty)
    }

    /// Rules of `category` in stored order.
    #[inline]
    pub fn rules(&self, category: RuleCategory) -> &[CompiledRule] {
        &self.rules[category.index()]
    }

    /// Resolve a handle. Handles from another generation resolve to `None`.
    pub fn get(&self, handle: RuleHandle) -> Option<&CompiledRule> {
        if handle.generation != self.generation {
            return None;
        }
        self.rules[handle.category.index()].get(handle.position())
    }

    pub fn handle(&self, category: RuleCategory, position: usize) -> Option<RuleHandle> {
        (position < self.len(category)).then(|| RuleHandle {
            generation: self.generation,
            category,
            position: position as u32,
        })
    }

    /// First flattened index belonging to `category`.
    #[inline]
    pub fn offset(&self, category: RuleCategory) -> usize {
        self.rules[..category.index()].iter().map(Vec::len).sum()
    }

    #[inline]
    pub fn flat_index(&self, category: RuleCategory, position: usize) -> usize {
        self.offset(category) + position
    }

    pub fn flat_index_of(&self, handle: RuleHandle) -> Option<usize> {
        self.get(handle)
            .map(|_| self.flat_index(handle.category, handle.position()))
    }

    pub fn counters(&self) -> Counters {
        let mut counters = Counters::default();
        for category in RuleCategory::ALL {
            counters.rules[category.index()] = self.len(category);
        }
        counters
    }
}
