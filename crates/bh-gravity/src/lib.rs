//! Blackhole Gravity
//!
//! Loads regex rules from the gravity rule database into the core engine and
//! keeps them current:
//!
//! - `source`: the [`RuleSource`] contract the engine reads rules through
//! - `memory`: an in-memory rule database, loadable from JSON
//! - `engine`: [`FilterEngine`], which owns the rules and performs reloads
//! - `request`: a thread-safe flag for requesting reloads

pub mod engine;
pub mod memory;
pub mod request;
pub mod source;

pub use engine::{DecisionCache, EngineOptions, FilterEngine, NoopCache, ReloadReport};
pub use memory::{ClientEntry, MemorySource, RuleEntry, DEFAULT_GROUP};
pub use request::ReloadRequest;
pub use source::{Client, RuleRow, RuleSource, Rows, StoreError};
