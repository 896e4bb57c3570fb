//! Filter engine with full-replace reloads.
//!
//! [`FilterEngine`] owns the compiled rules, the per-client enablement table
//! and the registry of known clients. A reload discards everything, reads the
//! regex tables again, recompiles them and re-derives enablement for every
//! client. The new rule set is built aside and swapped in once complete.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rustc_hash::FxHashMap;

use bh_core::{
    ClientEnablement, ClientId, ClientScope, CompileError, CompiledRule, CompilerOptions, Counters,
    DebugFlags, MatchEngine, MatchLimits, PatternCompiler, RuleCategory, RuleHandle, RuleStore,
    Verdict, CLI_ORIGIN_ID,
};

use crate::request::ReloadRequest;
use crate::source::{Client, RuleSource, StoreError};

// =============================================================================
// Collaborators
// =============================================================================

/// Downstream cache of blocking decisions.
pub trait DecisionCache {
    /// Forget every cached block/allow verdict.
    fn invalidate_block_decisions(&mut self);
}

/// Cache collaborator for setups without a decision cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl DecisionCache for NoopCache {
    fn invalidate_block_decisions(&mut self) {}
}

// =============================================================================
// Options and Reports
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub compiler: CompilerOptions,
    pub limits: MatchLimits,
    pub debug: DebugFlags,
}

/// Summary of one reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    pub blacklist_count: usize,
    pub whitelist_count: usize,
    /// Rules stored as unavailable because they failed to compile.
    pub failed_count: usize,
    /// Store generation after the reload.
    pub generation: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Bootstrap,
    Serving,
}

// =============================================================================
// Filter Engine
// =============================================================================

pub struct FilterEngine<S> {
    source: S,
    compiler: PatternCompiler,
    options: EngineOptions,
    store: RuleStore,
    enablement: ClientEnablement,
    clients: BTreeMap<ClientId, Client>,
    addresses: FxHashMap<String, ClientId>,
    next_client: u32,
    phase: Phase,
    reload_request: ReloadRequest,
}

impl<S: RuleSource> FilterEngine<S> {
    /// Create an empty engine. Call [`FilterEngine::bootstrap`] before serving.
    pub fn new(source: S, options: EngineOptions) -> Self {
        Self {
            source,
            compiler: PatternCompiler::new(options.compiler),
            options,
            store: RuleStore::new(),
            enablement: ClientEnablement::new(),
            clients: BTreeMap::new(),
            addresses: FxHashMap::default(),
            next_client: 0,
            phase: Phase::Bootstrap,
            reload_request: ReloadRequest::new(),
        }
    }

    /// Mutable access to the rule source. Changes take effect on the next reload.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn enablement(&self) -> &ClientEnablement {
        &self.enablement
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.phase == Phase::Bootstrap
    }

    pub fn counters(&self) -> Counters {
        Counters {
            clients: self.clients.len(),
            ..self.store.counters()
        }
    }

    pub fn rule(&self, handle: RuleHandle) -> Option<&CompiledRule> {
        self.store.get(handle)
    }

    // -------------------------------------------------------------------------
    // Reload
    // -------------------------------------------------------------------------

    /// Initial load. Does not touch any downstream cache.
    ///
    /// Client enablement lookups deferred during startup are performed here,
    /// and later client registrations query the rule source immediately.
    pub fn bootstrap(&mut self) -> ReloadReport {
        let report = self.rebuild();
        self.phase = Phase::Serving;
        report
    }

    /// Discard and rebuild all rules and client enablement.
    pub fn reload(&mut self, cache: &mut dyn DecisionCache) -> ReloadReport {
        cache.invalidate_block_decisions();
        let report = self.rebuild();
        self.phase = Phase::Serving;
        report
    }

    /// Handle for requesting a reload from outside the owner thread.
    pub fn reload_request(&self) -> ReloadRequest {
        self.reload_request.clone()
    }

    /// Perform a pending reload, if one was requested.
    pub fn reload_if_requested(&mut self, cache: &mut dyn DecisionCache) -> Option<ReloadReport> {
        if !self.reload_request.take() {
            return None;
        }
        Some(self.reload(cache))
    }

    fn rebuild(&mut self) -> ReloadReport {
        let start = Instant::now();
        let debug = self.options.debug;

        let mut store = self.store.successor();
        let mut failed_count = 0;
        for category in RuleCategory::PERSISTENT {
            failed_count += read_table(&self.source, &self.compiler, &mut store, category, debug);
        }

        let mut enablement = ClientEnablement::with_clients(self.clients.keys().copied());
        for client in self.clients.values() {
            grant_client(&self.source, &store, &mut enablement, client, debug);
        }

        self.store = store;
        self.enablement = enablement;

        let report = ReloadReport {
            blacklist_count: self.store.len(RuleCategory::Blacklist),
            whitelist_count: self.store.len(RuleCategory::Whitelist),
            failed_count,
            generation: self.store.generation(),
            elapsed: start.elapsed(),
        };

        info!(
            "Compiled {} whitelist and {} blacklist regex filters in {:.1} msec",
            report.whitelist_count,
            report.blacklist_count,
            report.elapsed.as_secs_f64() * 1000.0
        );

        report
    }

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    /// Register a client by address, returning its ordinal id.
    ///
    /// Registering a known address returns the existing id.
    pub fn register_client(&mut self, address: &str) -> ClientId {
        if let Some(id) = self.addresses.get(address) {
            return *id;
        }

        let id = ClientId(self.next_client);
        self.next_client += 1;
        self.addresses.insert(address.to_string(), id);
        self.clients.insert(
            id,
            Client {
                id,
                address: address.to_string(),
            },
        );
        self.associate(id);
        id
    }

    pub fn client_id(&self, address: &str) -> Option<ClientId> {
        self.addresses.get(address).copied()
    }

    /// Ensure `id` has an enablement entry and, once serving, install its grants.
    ///
    /// During bootstrap the lookup is deferred to the bootstrap reload.
    pub fn associate(&mut self, id: ClientId) {
        self.enablement.associate(id);
        if self.phase == Phase::Bootstrap {
            return;
        }
        let Some(client) = self.clients.get(&id) else {
            return;
        };
        grant_client(&self.source, &self.store, &mut self.enablement, client, self.options.debug);
    }

    /// Drop a client and all of its enablement.
    pub fn forget_client(&mut self, id: ClientId) -> bool {
        let Some(client) = self.clients.remove(&id) else {
            return false;
        };
        self.addresses.remove(&client.address);
        self.enablement.reset(id);
        self.enablement.remove(id);
        true
    }

    // -------------------------------------------------------------------------
    // Matching
    // -------------------------------------------------------------------------

    /// Compile a command-line test pattern into the CLI category.
    pub fn compile_cli_pattern(&mut self, pattern: &str) -> Result<RuleHandle, CompileError> {
        self.compiler
            .compile(&mut self.store, RuleCategory::CliTest, pattern, CLI_ORIGIN_ID)
    }

    /// Read-only matcher over the current rule set.
    pub fn matcher(&self) -> MatchEngine<'_> {
        MatchEngine::new(&self.store, &self.enablement)
            .with_limits(self.options.limits)
            .with_debug(self.options.debug)
    }

    /// Query-path decision for `domain` as seen by `scope`.
    pub fn verdict(&self, domain: &str, scope: ClientScope) -> Verdict {
        self.matcher().verdict(domain, scope)
    }
}

impl<S> std::fmt::Debug for FilterEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("generation", &self.store.generation())
            .field("rules", &self.store.total_len())
            .field("clients", &self.clients.len())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Table Loading
// =============================================================================

/// Read and compile one regex table into `store`.
///
/// Returns the number of rules that failed to compile.
fn read_table<S: RuleSource + ?Sized>(
    source: &S,
    compiler: &PatternCompiler,
    store: &mut RuleStore,
    category: RuleCategory,
    debug: DebugFlags,
) -> usize {
    let expected = match source.count_rows(category) {
        Ok(0) => return 0,
        Ok(count) => count,
        Err(err) => {
            warn!("{err}, assuming there are no {category} regex entries");
            return 0;
        }
    };

    store.reserve(category, expected);

    let rows = match source.rows(category) {
        Ok(rows) => rows,
        Err(err) => {
            error!("{err}");
            return 0;
        }
    };

    let mut failed = 0;
    for row in rows {
        // The table may have changed since it was counted
        if store.len(category) >= expected {
            let overflow = StoreError::RowOverflow { category, expected };
            info!("{overflow}");
            break;
        }

        // An empty filter would match every domain
        if row.pattern.trim().is_empty() {
            if debug.contains(DebugFlags::RELOAD) {
                debug!("Skipping empty {category} regex (DB ID {})", row.origin_id);
            }
            continue;
        }

        if debug.contains(DebugFlags::RELOAD) {
            debug!(
                "Compiling {} regex {} (DB ID {}): {}",
                category,
                store.len(category),
                row.origin_id,
                row.pattern
            );
        }

        if compiler
            .compile(store, category, &row.pattern, row.origin_id)
            .is_err()
        {
            failed += 1;
        }
    }

    failed
}

/// Replace the grants of `client` with what its groups allow in `store`.
fn grant_client<S: RuleSource + ?Sized>(
    source: &S,
    store: &RuleStore,
    enablement: &mut ClientEnablement,
    client: &Client,
    debug: DebugFlags,
) {
    enablement.reset(client.id);
    for category in RuleCategory::PERSISTENT {
        match source.client_group_origin_ids(client, category) {
            Ok(origins) => {
                let granted = enablement.grant_origins(client.id, store, category, &origins);
                if debug.contains(DebugFlags::CLIENTS) {
                    debug!(
                        "Enabled {} of {} {} regex filters for client {} ({})",
                        granted,
                        store.len(category),
                        category,
                        client.address,
                        client.id
                    );
                }
            }
            Err(err) => {
                warn!("{err}, no {category} regex filters enabled for client {}", client.address);
            }
        }
    }
}
