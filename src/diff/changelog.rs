//! Raw changelog between two JSON documents
//!
//! The walk descends matching object keys and emits one change per divergent
//! leaf or subtree. Arrays and scalars compare as whole values. Keys are
//! visited in sorted order, so the output sequence is deterministic for a
//! given input pair.

use serde_json::Value;

/// Kind of a single change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeType {
    /// Field present only in the current document
    Create,
    /// Field present in both with different values
    Update,
    /// Field present only in the previous document
    Delete,
}

impl ChangeType {
    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            "delete" => Ok(ChangeType::Delete),
            _ => Err(()),
        }
    }
}

/// One raw change before filtering and ranking
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Kind of change
    pub change_type: ChangeType,

    /// Field path segments from the document root
    pub path: Vec<String>,

    /// Value in the previous document
    pub from: Option<Value>,

    /// Value in the current document
    pub to: Option<Value>,
}

impl Change {
    /// Dotted rendering of the field path
    pub fn field_path(&self) -> String {
        self.path.join(".")
    }
}

/// Compute the raw changelog between two documents
pub fn changelog(previous: &Value, current: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    walk(previous, current, &mut Vec::new(), &mut changes);
    changes
}

fn walk(previous: &Value, current: &Value, path: &mut Vec<String>, out: &mut Vec<Change>) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(cur_map)) => {
            let mut keys: Vec<&String> = prev_map.keys().chain(cur_map.keys()).collect();
            keys.sort();
            keys.dedup();

            for key in keys {
                path.push(key.clone());
                match (prev_map.get(key), cur_map.get(key)) {
                    (Some(prev), Some(cur)) => walk(prev, cur, path, out),
                    (Some(prev), None) => out.push(Change {
                        change_type: ChangeType::Delete,
                        path: path.clone(),
                        from: Some(prev.clone()),
                        to: None,
                    }),
                    (None, Some(cur)) => out.push(Change {
                        change_type: ChangeType::Create,
                        path: path.clone(),
                        from: None,
                        to: Some(cur.clone()),
                    }),
                    (None, None) => unreachable!(),
                }
                path.pop();
            }
        }
        _ => {
            if previous != current {
                out.push(Change {
                    change_type: ChangeType::Update,
                    path: path.clone(),
                    from: Some(previous.clone()),
                    to: Some(current.clone()),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_documents_produce_no_changes() {
        let doc = json!({"facts": {"distro": {"name": "A", "version": "9.2"}}});
        assert!(changelog(&doc, &doc).is_empty());
    }

    #[test]
    fn test_scalar_update() {
        let prev = json!({"facts": {"distro": {"version": "9.2"}}});
        let cur = json!({"facts": {"distro": {"version": "9.3"}}});

        let changes = changelog(&prev, &cur);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Update);
        assert_eq!(changes[0].field_path(), "facts.distro.version");
        assert_eq!(changes[0].from, Some(json!("9.2")));
        assert_eq!(changes[0].to, Some(json!("9.3")));
    }

    #[test]
    fn test_create_and_delete_subtrees() {
        let prev = json!({"facts": {"modules": {"mail": {"version": 1}}}});
        let cur = json!({"facts": {"modules": {"web": {"version": 2}}}});

        let changes = changelog(&prev, &cur);
        assert_eq!(changes.len(), 2);

        assert_eq!(changes[0].change_type, ChangeType::Delete);
        assert_eq!(changes[0].field_path(), "facts.modules.mail");
        assert_eq!(changes[0].from, Some(json!({"version": 1})));

        assert_eq!(changes[1].change_type, ChangeType::Create);
        assert_eq!(changes[1].field_path(), "facts.modules.web");
        assert_eq!(changes[1].to, Some(json!({"version": 2})));
    }

    #[test]
    fn test_arrays_compare_as_whole_values() {
        let prev = json!({"nics": ["eth0"]});
        let cur = json!({"nics": ["eth0", "eth1"]});

        let changes = changelog(&prev, &cur);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Update);
        assert_eq!(changes[0].field_path(), "nics");
    }

    #[test]
    fn test_type_change_is_update() {
        let prev = json!({"memory": {"total": 1024}});
        let cur = json!({"memory": "1024MB"});

        let changes = changelog(&prev, &cur);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Update);
        assert_eq!(changes[0].field_path(), "memory");
    }

    #[test]
    fn test_output_order_is_deterministic() {
        let prev = json!({"z": 1, "a": 1, "m": 1});
        let cur = json!({"z": 2, "a": 2, "m": 2});

        let first = changelog(&prev, &cur);
        let second = changelog(&prev, &cur);
        assert_eq!(first, second);

        let paths: Vec<String> = first.iter().map(|c| c.field_path()).collect();
        assert_eq!(paths, vec!["a", "m", "z"]);
    }
}
