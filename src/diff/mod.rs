//! # Diff Engine
//!
//! Turns two inventory snapshots into a filtered list of semantic changes:
//! - Raw recursive changelog between the JSON documents
//! - Depth, path-length, and per-run volume caps
//! - Category assignment from a configurable prefix table
//! - Severity ranking from a configurable pattern table
//! - Noise suppression as the final significance filter
//! - Aggregate counters (category/severity/type distribution) for alerting
//!
//! The rule set is an immutable value swapped atomically on reload; every
//! diff run works on its own snapshot of the rules.

pub mod changelog;
pub mod engine;
pub mod rules;
pub mod value;

pub use changelog::{changelog, Change, ChangeType};
pub use engine::{ComputedDiff, DiffEngine, DiffError, DiffLimits, DiffOutput, DiffSummary};
pub use rules::{RuleError, RuleSet, RuleStore, Severity};
pub use value::{canonical_json, render_value};
