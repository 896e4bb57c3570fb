//! Core type definitions for Blackhole
//!
//! These types are shared by the pattern compiler, the rule store and the
//! matching engine.

use std::fmt;

// =============================================================================
// Rule Categories
// =============================================================================

/// Partition of the rule space.
///
/// The declaration order defines the flattened index space:
/// `[Blacklist][Whitelist][CliTest]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RuleCategory {
    /// Regex blacklist from the rule database
    Blacklist = 0,
    /// Regex whitelist from the rule database
    Whitelist = 1,
    /// Pattern supplied on the command line for a one-shot test
    CliTest = 2,
}

impl RuleCategory {
    /// Number of categories.
    pub const COUNT: usize = 3;

    /// All categories in flattened index order.
    pub const ALL: [RuleCategory; Self::COUNT] = [Self::Blacklist, Self::Whitelist, Self::CliTest];

    /// Categories loaded from the rule database on every reload.
    pub const PERSISTENT: [RuleCategory; 2] = [Self::Blacklist, Self::Whitelist];

    /// Position of this category in per-category arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Name used in log lines and CLI output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blacklist => "blacklist",
            Self::Whitelist => "whitelist",
            Self::CliTest => "CLI",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for RuleCategory {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Blacklist),
            1 => Ok(Self::Whitelist),
            2 => Ok(Self::CliTest),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Stable external identifier of a rule (its row id in the rule database).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OriginId(pub i64);

/// Synthetic origin id given to command-line test rules.
pub const CLI_ORIGIN_ID: OriginId = OriginId(0);

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordinal id of a client known to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which clients a match is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientScope {
    /// Ignore per-client enablement (standalone testing)
    All,
    /// Only rules enabled for this client are considered
    Client(ClientId),
}

impl From<ClientId> for ClientScope {
    fn from(id: ClientId) -> Self {
        Self::Client(id)
    }
}

// =============================================================================
// Debug Flags
// =============================================================================

bitflags::bitflags! {
    /// Verbose diagnostics switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DebugFlags: u32 {
        /// Log every rule evaluated during matching
        const REGEX = 1 << 0;
        /// Log every row read during a reload
        const RELOAD = 1 << 1;
        /// Log per-client enablement changes
        const CLIENTS = 1 << 2;
    }
}

impl DebugFlags {
    /// Parse a single flag name as used in configuration files.
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "regex" => Some(Self::REGEX),
            "reload" => Some(Self::RELOAD),
            "clients" => Some(Self::CLIENTS),
            "all" => Some(Self::all()),
            _ => None,
        }
    }
}

// =============================================================================
// Matching Limits
// =============================================================================

/// Longest textual domain name permitted by DNS, counting the trailing dot of
/// a fully qualified name.
pub const MAX_DOMAIN_LEN: usize = 254;

/// Bounds applied to every match evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLimits {
    /// Inputs longer than this are rejected without evaluating any rule.
    pub max_input_len: usize,
}

impl MatchLimits {
    /// Whether `input` is short enough to be evaluated at all.
    #[inline]
    pub fn admits(&self, input: &str) -> bool {
        input.len() <= self.max_input_len
    }
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self {
            max_input_len: MAX_DOMAIN_LEN,
        }
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Outcome of evaluating a query domain on the resolver's hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No regex rule applies; resolve normally
    Pass,
    /// A whitelist rule matched
    Allowed(OriginId),
    /// A blacklist rule matched and no whitelist rule did
    Blocked(OriginId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_order_matches_index() {
        for (i, category) in RuleCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
            assert_eq!(RuleCategory::try_from(i as u8), Ok(*category));
        }
        assert!(RuleCategory::try_from(3).is_err());
    }

    #[test]
    fn test_category_names() {
        assert_eq!(RuleCategory::Blacklist.to_string(), "blacklist");
        assert_eq!(RuleCategory::Whitelist.to_string(), "whitelist");
        assert_eq!(RuleCategory::CliTest.to_string(), "CLI");
    }

    #[test]
    fn test_debug_flag_names() {
        assert_eq!(DebugFlags::from_config_name("regex"), Some(DebugFlags::REGEX));
        assert_eq!(DebugFlags::from_config_name(" Reload "), Some(DebugFlags::RELOAD));
        assert_eq!(DebugFlags::from_config_name("all"), Some(DebugFlags::all()));
        assert_eq!(DebugFlags::from_config_name("gravity"), None);
    }

    #[test]
    fn test_default_limit_admits_fully_qualified_name() {
        let limits = MatchLimits::default();
        let fqdn = format!("{}.com.", "a".repeat(249));
        assert_eq!(fqdn.len(), 254);
        assert!(limits.admits(&fqdn));
        assert!(!limits.admits(&format!("a{fqdn}")));
    }
}
