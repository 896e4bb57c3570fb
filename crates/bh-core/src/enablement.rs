//! Per-client rule enablement
//!
//! Each known client owns the set of flattened rule indices that are enabled
//! for it. An index missing from the set means the rule is disabled for that
//! client.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::store::RuleStore;
use crate::types::{ClientId, OriginId, RuleCategory};

#[derive(Debug, Default, Clone)]
pub struct ClientEnablement {
    clients: FxHashMap<ClientId, FxHashSet<usize>>,
}

impl ClientEnablement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state with an empty entry for every given client.
    pub fn with_clients<I>(clients: I) -> Self
    where
        I: IntoIterator<Item = ClientId>,
    {
        Self {
            clients: clients.into_iter().map(|id| (id, FxHashSet::default())).collect(),
        }
    }

    /// Ensure an entry exists for `client`. Existing grants are kept.
    pub fn associate(&mut self, client: ClientId) {
        self.clients.entry(client).or_default();
    }

    /// Disable every rule for `client`.
    pub fn reset(&mut self, client: ClientId) {
        if let Some(enabled) = self.clients.get_mut(&client) {
            enabled.clear();
        }
    }

    /// Drop the entry for `client` entirely.
    pub fn remove(&mut self, client: ClientId) -> bool {
        self.clients.remove(&client).is_some()
    }

    pub fn enable(&mut self, client: ClientId, flat_index: usize) {
        self.clients.entry(client).or_default().insert(flat_index);
    }

    /// Enable every rule of `category` whose origin id is in `origins`.
    ///
    /// Returns the number of rules enabled.
    pub fn grant_origins(
        &mut self,
        client: ClientId,
        store: &RuleStore,
        category: RuleCategory,
        origins: &FxHashSet<OriginId>,
    ) -> usize {
        let offset = store.offset(category);
        let enabled = self.clients.entry(client).or_default();
        let mut granted = 0;
        for (position, rule) in store.rules(category).iter().enumerate() {
            if origins.contains(&rule.origin_id()) {
                enabled.insert(offset + position);
                granted += 1;
            }
        }
        granted
    }

    #[inline]
    pub fn is_enabled(&self, client: ClientId, flat_index: usize) -> bool {
        self.clients
            .get(&client)
            .is_some_and(|enabled| enabled.contains(&flat_index))
    }

    pub fn contains_client(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    pub fn enabled_count(&self, client: ClientId) -> usize {
        self.clients.get(&client).map_or(0, FxHashSet::len)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Total number of grants across all clients.
    pub fn total_enabled(&self) -> usize {
        self.clients.values().map(FxHashSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::PatternCompiler;

    fn store_with(blacklist: &[i64], whitelist: &[i64]) -> RuleStore {
        let mut store = RuleStore::new();
        let compiler = PatternCompiler::default();
        for id in blacklist {
            compiler
                .compile(&mut store, RuleCategory::Blacklist, "ads", OriginId(*id))
                .expect("pattern should compile");
        }
        for id in whitelist {
            compiler
                .compile(&mut store, RuleCategory::Whitelist, "ok", OriginId(*id))
                .expect("pattern should compile");
        }
        store
    }

    #[test]
    fn test_grant_origins_uses_flattened_index() {
        let store = store_with(&[10, 11, 12], &[20, 21]);
        let mut enablement = ClientEnablement::new();
        let client = ClientId(0);

        let origins: FxHashSet<OriginId> = [OriginId(21)].into_iter().collect();
        let granted = enablement.grant_origins(client, &store, RuleCategory::Whitelist, &origins);

        assert_eq!(granted, 1);
        assert!(enablement.is_enabled(client, 4));
        assert!(!enablement.is_enabled(client, 3));
        assert!(!enablement.is_enabled(client, 1));
    }

    #[test]
    fn test_associate_is_idempotent() {
        let mut enablement = ClientEnablement::new();
        let client = ClientId(3);
        enablement.associate(client);
        enablement.enable(client, 2);
        enablement.associate(client);

        assert!(enablement.contains_client(client));
        assert!(enablement.is_enabled(client, 2));
    }

    #[test]
    fn test_reset_clears_grants_but_keeps_client() {
        let mut enablement = ClientEnablement::with_clients([ClientId(1), ClientId(2)]);
        enablement.enable(ClientId(1), 0);
        enablement.enable(ClientId(1), 5);
        enablement.enable(ClientId(2), 5);

        enablement.reset(ClientId(1));

        assert!(enablement.contains_client(ClientId(1)));
        assert_eq!(enablement.enabled_count(ClientId(1)), 0);
        assert!(enablement.is_enabled(ClientId(2), 5));
        assert_eq!(enablement.total_enabled(), 1);
    }

    #[test]
    fn test_unknown_client_has_nothing_enabled() {
        let mut enablement = ClientEnablement::new();
        enablement.enable(ClientId(1), 0);
        assert!(!enablement.is_enabled(ClientId(9), 0));
        assert!(enablement.remove(ClientId(1)));
        assert!(!enablement.remove(ClientId(1)));
        assert_eq!(enablement.client_count(), 0);
    }
}
