//! In-memory rule database.
//!
//! Models the parts of the gravity database the regex engine reads: regex
//! rules with an enabled flag and group assignments, and clients with their
//! group memberships. Clients without an explicit entry belong to the default
//! groups. The same model can be loaded from a JSON file:
//!
//! ```json
//! {
//!   "blacklist": [{ "id": 1, "pattern": "^ads\\.", "groups": [0, 2] }],
//!   "whitelist": [{ "id": 5, "pattern": "^cdn\\.", "enabled": false }],
//!   "clients": [{ "address": "192.168.1.20", "groups": [2] }]
//! }
//! ```

use std::path::Path;

use rustc_hash::FxHashSet;
use serde::Deserialize;

use bh_core::{OriginId, RuleCategory};

use crate::source::{Client, RuleRow, RuleSource, Rows, StoreError};

/// Group every rule and client belongs to unless configured otherwise.
pub const DEFAULT_GROUP: u32 = 0;

fn default_groups() -> Vec<u32> {
    vec![DEFAULT_GROUP]
}

const fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub id: i64,
    pub pattern: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_groups")]
    pub groups: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientEntry {
    pub address: String,
    #[serde(default = "default_groups")]
    pub groups: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySource {
    #[serde(default)]
    blacklist: Vec<RuleEntry>,
    #[serde(default)]
    whitelist: Vec<RuleEntry>,
    #[serde(default)]
    clients: Vec<ClientEntry>,
    /// Groups of clients without an entry in `clients`.
    #[serde(default = "default_groups")]
    default_groups: Vec<u32>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            clients: Vec::new(),
            default_groups: default_groups(),
        }
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a rule database from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a rule database from JSON text.
    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(content)?)
    }

    fn table(&self, category: RuleCategory) -> &[RuleEntry] {
        match category {
            RuleCategory::Blacklist => &self.blacklist,
            RuleCategory::Whitelist => &self.whitelist,
            RuleCategory::CliTest => &[],
        }
    }

    fn table_mut(&mut self, category: RuleCategory) -> Option<&mut Vec<RuleEntry>> {
        match category {
            RuleCategory::Blacklist => Some(&mut self.blacklist),
            RuleCategory::Whitelist => Some(&mut self.whitelist),
            RuleCategory::CliTest => None,
        }
    }

    /// Add an enabled rule assigned to the default group.
    ///
    /// CLI test rules are never persisted; adding one is a no-op.
    pub fn add_rule(&mut self, category: RuleCategory, id: i64, pattern: impl Into<String>) -> &mut Self {
        self.add_rule_in_groups(category, id, pattern, &[DEFAULT_GROUP])
    }

    pub fn add_rule_in_groups(
        &mut self,
        category: RuleCategory,
        id: i64,
        pattern: impl Into<String>,
        groups: &[u32],
    ) -> &mut Self {
        if let Some(table) = self.table_mut(category) {
            table.push(RuleEntry {
                id,
                pattern: pattern.into(),
                enabled: true,
                groups: groups.to_vec(),
            });
        }
        self
    }

    /// Returns false if no such rule exists.
    pub fn set_rule_enabled(&mut self, category: RuleCategory, id: i64, enabled: bool) -> bool {
        let Some(table) = self.table_mut(category) else {
            return false;
        };
        match table.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn remove_rule(&mut self, category: RuleCategory, id: i64) -> bool {
        let Some(table) = self.table_mut(category) else {
            return false;
        };
        let before = table.len();
        table.retain(|entry| entry.id != id);
        table.len() != before
    }

    /// Assign `address` to exactly `groups`.
    pub fn set_client_groups(&mut self, address: impl Into<String>, groups: &[u32]) -> &mut Self {
        let address = address.into();
        match self.clients.iter_mut().find(|c| c.address == address) {
            Some(entry) => entry.groups = groups.to_vec(),
            None => self.clients.push(ClientEntry {
                address,
                groups: groups.to_vec(),
            }),
        }
        self
    }

    fn groups_of(&self, address: &str) -> &[u32] {
        self.clients
            .iter()
            .find(|c| c.address == address)
            .map_or(self.default_groups.as_slice(), |c| c.groups.as_slice())
    }
}

impl RuleSource for MemorySource {
    fn count_rows(&self, category: RuleCategory) -> Result<usize, StoreError> {
        Ok(self.table(category).iter().filter(|e| e.enabled).count())
    }

    fn rows(&self, category: RuleCategory) -> Result<Rows<'_>, StoreError> {
        Ok(Box::new(
            self.table(category)
                .iter()
                .filter(|e| e.enabled)
                .map(|e| RuleRow::new(e.pattern.clone(), e.id)),
        ))
    }

    fn client_group_origin_ids(
        &self,
        client: &Client,
        category: RuleCategory,
    ) -> Result<FxHashSet<OriginId>, StoreError> {
        let groups = self.groups_of(&client.address);
        Ok(self
            .table(category)
            .iter()
            .filter(|e| e.enabled && e.groups.iter().any(|g| groups.contains(g)))
            .map(|e| OriginId(e.id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bh_core::ClientId;

    fn ids(list: &[i64]) -> FxHashSet<OriginId> {
        list.iter().copied().map(OriginId).collect()
    }

    fn client(address: &str) -> Client {
        Client {
            id: ClientId(0),
            address: address.to_string(),
        }
    }

    #[test]
    fn test_parse_database() {
        let json = r#"{
            "blacklist": [
                { "id": 1, "pattern": "^ads\\." },
                { "id": 2, "pattern": "tracker", "enabled": false }
            ],
            "whitelist": [{ "id": 3, "pattern": "^cdn\\.", "groups": [4] }],
            "clients": [{ "address": "10.0.0.2", "groups": [4] }]
        }"#;

        let source = MemorySource::from_json(json).expect("database should parse");
        assert_eq!(source.count_rows(RuleCategory::Blacklist).unwrap(), 1);
        assert_eq!(source.count_rows(RuleCategory::Whitelist).unwrap(), 1);
        assert_eq!(source.count_rows(RuleCategory::CliTest).unwrap(), 0);

        let rows: Vec<RuleRow> = source.rows(RuleCategory::Blacklist).unwrap().collect();
        assert_eq!(rows, vec![RuleRow::new("^ads\\.", 1)]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{ "blacklist": [], "regex": [] }"#;
        assert!(matches!(MemorySource::from_json(json), Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_client_groups() {
        let mut source = MemorySource::new();
        source
            .add_rule(RuleCategory::Blacklist, 1, "^ads\\.")
            .add_rule_in_groups(RuleCategory::Blacklist, 2, "tracker", &[7])
            .set_client_groups("10.0.0.9", &[7]);

        let default_ids = source
            .client_group_origin_ids(&client("10.0.0.1"), RuleCategory::Blacklist)
            .unwrap();
        assert_eq!(default_ids, ids(&[1]));

        let grouped_ids = source
            .client_group_origin_ids(&client("10.0.0.9"), RuleCategory::Blacklist)
            .unwrap();
        assert_eq!(grouped_ids, ids(&[2]));
    }

    #[test]
    fn test_disabled_rules_are_invisible() {
        let mut source = MemorySource::new();
        source.add_rule(RuleCategory::Whitelist, 1, "a").add_rule(RuleCategory::Whitelist, 2, "b");
        assert!(source.set_rule_enabled(RuleCategory::Whitelist, 2, false));
        assert!(!source.set_rule_enabled(RuleCategory::Whitelist, 9, false));

        assert_eq!(source.count_rows(RuleCategory::Whitelist).unwrap(), 1);
        let enabled = source
            .client_group_origin_ids(&client("any"), RuleCategory::Whitelist)
            .unwrap();
        assert_eq!(enabled, ids(&[1]));
    }

    #[test]
    fn test_cli_rules_not_persisted() {
        let mut source = MemorySource::new();
        source.add_rule(RuleCategory::CliTest, 1, "x");
        assert_eq!(source.count_rows(RuleCategory::CliTest).unwrap(), 0);
        assert!(!source.remove_rule(RuleCategory::CliTest, 1));
    }
}
