//! Integration tests for the diff pipeline
//!
//! This file exercises the complete path from raw inventory documents to
//! categorised, ranked, filtered changes, plus the fingerprinting the
//! inventory worker uses for duplicate absorption.

use collect::diff::{ChangeType, DiffEngine, DiffLimits, RuleStore, Severity};
use collect::workers::fingerprint;
use serde_json::json;

fn engine() -> std::sync::Arc<DiffEngine> {
    DiffEngine::new(RuleStore::new(None).unwrap(), DiffLimits::default())
}

#[test]
fn test_duplicate_payload_has_identical_fingerprint() {
    // The same document submitted twice must fingerprint identically even
    // when it arrives with different key order and whitespace
    let first: serde_json::Value =
        serde_json::from_str(r#"{"facts": {"distro": "A", "memory": 1024}}"#).unwrap();
    let second: serde_json::Value =
        serde_json::from_str(r#"{ "facts":{"memory":1024,"distro":"A"} }"#).unwrap();

    assert_eq!(fingerprint(&first), fingerprint(&second));
}

#[test]
fn test_distinct_payloads_have_distinct_fingerprints() {
    let a = json!({"facts": {"distro": "A"}});
    let b = json!({"facts": {"distro": "B"}});
    assert_ne!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn test_os_upgrade_end_to_end() {
    let previous = json!({
        "uuid": "c8c2b3f0",
        "installation": "nethserver",
        "facts": {
            "distro": {"name": "NethServer", "version": "9.2"},
            "memory": {"total_mb": 8192},
            "modules": {"mail": {"version": "1.2"}}
        }
    });
    let current = json!({
        "uuid": "c8c2b3f0",
        "installation": "nethserver",
        "facts": {
            "distro": {"name": "NethServer", "version": "9.3"},
            "memory": {"total_mb": 8192},
            "modules": {"mail": {"version": "1.2"}}
        }
    });

    let output = engine().compute(&previous, &current).unwrap();

    assert_eq!(output.changes.len(), 1);
    let change = &output.changes[0];
    assert_eq!(change.field_path, "facts.distro.version");
    assert_eq!(change.change_type, ChangeType::Update);
    assert_eq!(change.category, "operating_system");
    assert_eq!(change.severity, Severity::High);
    assert_eq!(change.previous_value.as_deref(), Some("\"9.2\""));
    assert_eq!(change.current_value.as_deref(), Some("\"9.3\""));

    assert_eq!(output.summary.total, 1);
    assert_eq!(
        output.summary.dominant_category.as_deref(),
        Some("operating_system")
    );
}

#[test]
fn test_module_removal_is_critical() {
    let previous = json!({"facts": {"modules": {"mail": {"version": "1.2"}, "web": {"version": "2.0"}}}});
    let current = json!({"facts": {"modules": {"web": {"version": "2.0"}}}});

    let output = engine().compute(&previous, &current).unwrap();
    assert_eq!(output.changes.len(), 1);

    let change = &output.changes[0];
    assert_eq!(change.change_type, ChangeType::Delete);
    assert_eq!(change.field_path, "facts.modules.mail");
    assert_eq!(change.category, "modules");
    assert_eq!(change.severity, Severity::Critical);
    assert!((output.summary.critical_ratio - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_feature_toggle_categorised_per_feature() {
    let previous = json!({"facts": {"features": {"backup": {"enabled": false}}}});
    let current = json!({"facts": {"features": {"backup": {"enabled": true}}}});

    let output = engine().compute(&previous, &current).unwrap();
    assert_eq!(output.changes.len(), 1);
    assert_eq!(output.changes[0].category, "features_backup");
}

#[test]
fn test_counter_wobble_is_suppressed() {
    let previous = json!({"facts": {
        "uptime": 10_000,
        "network": {"eth0": {"rx_bytes": 1, "speed": 1000}},
        "last_seen": "2026-07-30T10:00:00Z"
    }});
    let current = json!({"facts": {
        "uptime": 20_000,
        "network": {"eth0": {"rx_bytes": 999, "speed": 1000}},
        "last_seen": "2026-08-01T10:00:00Z"
    }});

    let output = engine().compute(&previous, &current).unwrap();
    assert!(
        output.changes.is_empty(),
        "noise survived: {:?}",
        output.changes
    );
}

#[test]
fn test_mixed_run_orders_deterministically() {
    let previous = json!({"facts": {
        "distro": {"version": "9.2"},
        "modules": {"mail": {"v": 1}},
        "memory": {"total_mb": 4096}
    }});
    let current = json!({"facts": {
        "distro": {"version": "9.3"},
        "modules": {},
        "memory": {"total_mb": 8192}
    }});

    let eng = engine();
    let first = eng.compute(&previous, &current).unwrap();
    let second = eng.compute(&previous, &current).unwrap();

    assert_eq!(first.changes, second.changes);

    let paths: Vec<&str> = first.changes.iter().map(|c| c.field_path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "facts.distro.version",
            "facts.memory.total_mb",
            "facts.modules.mail",
        ]
    );
}

#[test]
fn test_depth_cap_limits_deep_documents() {
    let limits = DiffLimits {
        max_depth: 3,
        ..Default::default()
    };
    let eng = DiffEngine::new(RuleStore::new(None).unwrap(), limits);

    let previous = json!({"a": {"b": {"c": {"d": 1}}}, "facts": {"distro": {"version": "9.2"}}});
    let current = json!({"a": {"b": {"c": {"d": 2}}}, "facts": {"distro": {"version": "9.3"}}});

    let output = eng.compute(&previous, &current).unwrap();
    let paths: Vec<&str> = output.changes.iter().map(|c| c.field_path.as_str()).collect();
    assert_eq!(paths, vec!["facts.distro.version"]);
}

#[test]
fn test_new_system_first_diff_counts_creates() {
    let previous = json!({"facts": {}});
    let current = json!({"facts": {
        "distro": {"name": "NethSecurity", "version": "8.0"},
        "modules": {"firewall": {"version": "1.0"}}
    }});

    let output = engine().compute(&previous, &current).unwrap();

    assert_eq!(output.changes.len(), 2);
    assert!(output
        .changes
        .iter()
        .all(|c| c.change_type == ChangeType::Create));
    assert_eq!(output.summary.by_type.get("create"), Some(&2));
}
