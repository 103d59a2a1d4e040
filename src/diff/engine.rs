//! Diff pipeline: validate, walk, filter, categorise, rank, summarise

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::changelog::{changelog, ChangeType};
use super::rules::{RuleSet, RuleStore, Severity};
use super::value::render_value;

/// Diff computation errors
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Document is not an object: {0}")]
    NotAnObject(&'static str),
}

/// Top-level keys a well-formed inventory is expected to carry
const EXPECTED_TOP_LEVEL: [&str; 3] = ["facts", "uuid", "installation"];

/// Structural limits applied during a diff run
#[derive(Debug, Clone)]
pub struct DiffLimits {
    /// Maximum path depth considered
    pub max_depth: usize,

    /// Maximum rendered field-path length
    pub max_field_path: usize,

    /// Per-run cap on emitted changes
    pub max_changes: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_field_path: 255,
            max_changes: 1000,
        }
    }
}

/// One change surviving every filter
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedDiff {
    /// Dotted field path
    pub field_path: String,

    /// Kind of change
    pub change_type: ChangeType,

    /// Rendered previous value
    pub previous_value: Option<String>,

    /// Rendered current value
    pub current_value: Option<String>,

    /// Assigned category
    pub category: String,

    /// Assigned severity
    pub severity: Severity,
}

/// Aggregate counters over a diff run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DiffSummary {
    /// Surviving change count
    pub total: usize,

    /// Changes per category
    pub by_category: BTreeMap<String, usize>,

    /// Changes per severity
    pub by_severity: BTreeMap<String, usize>,

    /// Changes per diff type
    pub by_type: BTreeMap<String, usize>,

    /// Category with the most changes
    pub dominant_category: Option<String>,

    /// Share of critical changes among survivors
    pub critical_ratio: f64,
}

/// Result of one diff run
#[derive(Debug, Clone)]
pub struct DiffOutput {
    /// Surviving changes, in deterministic path order
    pub changes: Vec<ComputedDiff>,

    /// Aggregate counters over the survivors
    pub summary: DiffSummary,

    /// Whether the per-run cap cut the walk short
    pub truncated: bool,
}

/// The diff engine
pub struct DiffEngine {
    rules: RuleStore,
    limits: DiffLimits,
}

impl DiffEngine {
    /// Create an engine over the given rule store and limits
    pub fn new(rules: RuleStore, limits: DiffLimits) -> Arc<Self> {
        Arc::new(Self { rules, limits })
    }

    /// Reload the rule file (atomic swap; running diffs keep their snapshot)
    pub fn reload_rules(&self) -> Result<(), super::rules::RuleError> {
        self.rules.reload()
    }

    /// Current rule snapshot
    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.snapshot()
    }

    /// Compute the filtered, categorised diff between two snapshots.
    ///
    /// Deterministic: identical documents and rule set produce an identical
    /// output sequence.
    pub fn compute(&self, previous: &Value, current: &Value) -> Result<DiffOutput, DiffError> {
        if !previous.is_object() {
            return Err(DiffError::NotAnObject("previous"));
        }
        if !current.is_object() {
            return Err(DiffError::NotAnObject("current"));
        }

        for key in EXPECTED_TOP_LEVEL {
            if current.get(key).is_none() {
                tracing::warn!(key, "inventory document missing expected top-level key");
            }
        }

        let rules = self.rules.snapshot();
        let raw = changelog(previous, current);

        let mut changes = Vec::new();
        let mut truncated = false;

        for change in raw {
            if changes.len() >= self.limits.max_changes {
                tracing::warn!(
                    cap = self.limits.max_changes,
                    "change cap reached, truncating diff run"
                );
                truncated = true;
                break;
            }

            if change.path.len() > self.limits.max_depth {
                continue;
            }

            let field_path = change.field_path();
            if field_path.len() > self.limits.max_field_path {
                continue;
            }

            if rules.is_noise(&field_path) {
                continue;
            }

            let category = rules.categorize(&change.path);
            let severity = rules.severity(&field_path, change.change_type);

            changes.push(ComputedDiff {
                field_path,
                change_type: change.change_type,
                previous_value: change.from.as_ref().map(render_value),
                current_value: change.to.as_ref().map(render_value),
                category,
                severity,
            });
        }

        let summary = summarize(&changes);

        Ok(DiffOutput {
            changes,
            summary,
            truncated,
        })
    }
}

/// Aggregate counters over a set of surviving changes
fn summarize(changes: &[ComputedDiff]) -> DiffSummary {
    let mut summary = DiffSummary {
        total: changes.len(),
        ..Default::default()
    };

    for change in changes {
        *summary
            .by_category
            .entry(change.category.clone())
            .or_insert(0) += 1;
        *summary
            .by_severity
            .entry(change.severity.as_str().to_string())
            .or_insert(0) += 1;
        *summary
            .by_type
            .entry(change.change_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    summary.dominant_category = summary
        .by_category
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(category, _)| category.clone());

    if !changes.is_empty() {
        let critical = changes
            .iter()
            .filter(|c| c.severity == Severity::Critical)
            .count();
        summary.critical_ratio = critical as f64 / changes.len() as f64;
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> Arc<DiffEngine> {
        DiffEngine::new(RuleStore::new(None).unwrap(), DiffLimits::default())
    }

    fn engine_with_limits(limits: DiffLimits) -> Arc<DiffEngine> {
        DiffEngine::new(RuleStore::new(None).unwrap(), limits)
    }

    #[test]
    fn test_os_upgrade_scenario() {
        let prev = json!({"facts": {"distro": {"name": "NethServer", "version": "9.2"}}});
        let cur = json!({"facts": {"distro": {"name": "NethServer", "version": "9.3"}}});

        let output = engine().compute(&prev, &cur).unwrap();
        assert_eq!(output.changes.len(), 1);

        let change = &output.changes[0];
        assert_eq!(change.field_path, "facts.distro.version");
        assert_eq!(change.change_type, ChangeType::Update);
        assert_eq!(change.category, "operating_system");
        assert_eq!(change.severity, Severity::High);
        assert_eq!(change.previous_value.as_deref(), Some("\"9.2\""));
        assert_eq!(change.current_value.as_deref(), Some("\"9.3\""));
    }

    #[test]
    fn test_rejects_non_objects() {
        let err = engine().compute(&json!([1]), &json!({})).unwrap_err();
        assert!(matches!(err, DiffError::NotAnObject("previous")));

        let err = engine().compute(&json!({}), &json!("x")).unwrap_err();
        assert!(matches!(err, DiffError::NotAnObject("current")));
    }

    #[test]
    fn test_noise_is_dropped() {
        let prev = json!({"facts": {"uptime": 100, "distro": {"version": "9.2"}}});
        let cur = json!({"facts": {"uptime": 200, "distro": {"version": "9.3"}}});

        let output = engine().compute(&prev, &cur).unwrap();
        let paths: Vec<&str> = output.changes.iter().map(|c| c.field_path.as_str()).collect();
        assert_eq!(paths, vec!["facts.distro.version"]);
    }

    #[test]
    fn test_depth_filter() {
        let limits = DiffLimits {
            max_depth: 2,
            ..Default::default()
        };
        let prev = json!({"a": {"b": {"c": 1}}, "top": 1});
        let cur = json!({"a": {"b": {"c": 2}}, "top": 2});

        let output = engine_with_limits(limits).compute(&prev, &cur).unwrap();
        let paths: Vec<&str> = output.changes.iter().map(|c| c.field_path.as_str()).collect();
        assert_eq!(paths, vec!["top"]);
    }

    #[test]
    fn test_field_path_length_filter() {
        let limits = DiffLimits {
            max_field_path: 10,
            ..Default::default()
        };
        let prev = json!({"short": 1, "a_very_long_field_name": 1});
        let cur = json!({"short": 2, "a_very_long_field_name": 2});

        let output = engine_with_limits(limits).compute(&prev, &cur).unwrap();
        let paths: Vec<&str> = output.changes.iter().map(|c| c.field_path.as_str()).collect();
        assert_eq!(paths, vec!["short"]);
    }

    #[test]
    fn test_change_cap_truncates() {
        let limits = DiffLimits {
            max_changes: 3,
            ..Default::default()
        };
        let mut prev = serde_json::Map::new();
        let mut cur = serde_json::Map::new();
        for i in 0..10 {
            prev.insert(format!("field_{i:02}"), json!(1));
            cur.insert(format!("field_{i:02}"), json!(2));
        }

        let output = engine_with_limits(limits)
            .compute(&Value::Object(prev), &Value::Object(cur))
            .unwrap();
        assert_eq!(output.changes.len(), 3);
        assert!(output.truncated);
    }

    #[test]
    fn test_deterministic_output() {
        let prev = json!({"facts": {"modules": {"mail": 1, "web": 1}, "distro": {"version": "9.2"}}});
        let cur = json!({"facts": {"modules": {"web": 2}, "distro": {"version": "9.3"}}});

        let eng = engine();
        let first = eng.compute(&prev, &cur).unwrap();
        let second = eng.compute(&prev, &cur).unwrap();
        assert_eq!(first.changes, second.changes);
    }

    #[test]
    fn test_summary_counters() {
        let prev = json!({"facts": {
            "modules": {"mail": {"v": 1}},
            "distro": {"version": "9.2"}
        }});
        let cur = json!({"facts": {
            "modules": {},
            "distro": {"version": "9.3"}
        }});

        let output = engine().compute(&prev, &cur).unwrap();
        let summary = &output.summary;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_category.get("modules"), Some(&1));
        assert_eq!(summary.by_category.get("operating_system"), Some(&1));
        assert_eq!(summary.by_severity.get("critical"), Some(&1));
        assert_eq!(summary.by_severity.get("high"), Some(&1));
        assert_eq!(summary.by_type.get("delete"), Some(&1));
        assert_eq!(summary.by_type.get("update"), Some(&1));
        assert!((summary.critical_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_identical_documents_produce_empty_output() {
        let doc = json!({"facts": {"distro": {"version": "9.2"}}});
        let output = engine().compute(&doc, &doc).unwrap();
        assert!(output.changes.is_empty());
        assert_eq!(output.summary.total, 0);
        assert!(!output.truncated);
    }
}
