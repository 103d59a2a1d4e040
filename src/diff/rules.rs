//! Categorisation, severity, and noise rules
//!
//! Rules are data: a JSON file maps path prefixes to categories, path
//! patterns to severities, and lists the noise patterns dropped by the
//! significance filter. A compiled-in default set is used when no file is
//! configured. Reload swaps the compiled set atomically; readers hold a
//! snapshot for the duration of a diff run.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::changelog::ChangeType;

/// Default rule set, identical to `rules/default_rules.json`
const DEFAULT_RULES: &str = include_str!("../../rules/default_rules.json");

/// Compiled defaults, shared by every store without a rule file
static BUILTIN_RULES: Lazy<Arc<RuleSet>> = Lazy::new(|| Arc::new(RuleSet::builtin()));

/// Rule loading errors
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule file read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rule file parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid rule pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("Unknown diff type: {0}")]
    UnknownDiffType(String),
}

/// Change severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine drift
    Low,
    /// Worth recording
    Medium,
    /// Operationally relevant
    High,
    /// Demands attention
    Critical,
}

impl Severity {
    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(()),
        }
    }
}

/// Raw rule file shape
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    categories: Vec<CategoryRuleDef>,
    #[serde(default)]
    severities: Vec<SeverityRuleDef>,
    default_severity: Option<String>,
    #[serde(default)]
    noise: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryRuleDef {
    prefix: String,
    category: String,
}

#[derive(Debug, Deserialize)]
struct SeverityRuleDef {
    pattern: String,
    diff_type: Option<String>,
    severity: String,
}

/// Compiled category rule
#[derive(Debug, Clone)]
struct CategoryRule {
    prefix: Vec<String>,
    category: String,
}

/// Compiled severity rule
#[derive(Debug)]
struct SeverityRule {
    pattern: Regex,
    diff_type: Option<ChangeType>,
    severity: Severity,
}

/// An immutable, compiled rule set
#[derive(Debug)]
pub struct RuleSet {
    categories: Vec<CategoryRule>,
    severities: Vec<SeverityRule>,
    default_severity: Severity,
    noise: Vec<Regex>,

    /// When this set was compiled
    pub loaded_at: DateTime<Utc>,

    /// How long parsing and compilation took
    pub load_time: Duration,
}

impl RuleSet {
    /// Compile a rule set from its JSON source
    pub fn from_json(source: &str) -> Result<Self, RuleError> {
        let started = Instant::now();
        let file: RuleFile = serde_json::from_str(source)?;

        let categories = file
            .categories
            .into_iter()
            .map(|def| CategoryRule {
                prefix: def.prefix.split('.').map(str::to_string).collect(),
                category: def.category,
            })
            .collect();

        let mut severities = Vec::new();
        for def in file.severities {
            let severity = def
                .severity
                .parse()
                .map_err(|_| RuleError::UnknownSeverity(def.severity.clone()))?;
            let diff_type = match def.diff_type {
                Some(s) => Some(
                    s.parse()
                        .map_err(|_| RuleError::UnknownDiffType(s.clone()))?,
                ),
                None => None,
            };
            severities.push(SeverityRule {
                pattern: Regex::new(&def.pattern)?,
                diff_type,
                severity,
            });
        }

        let default_severity = match file.default_severity {
            Some(s) => s
                .parse()
                .map_err(|_| RuleError::UnknownSeverity(s.clone()))?,
            None => Severity::Medium,
        };

        let noise = file
            .noise
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            categories,
            severities,
            default_severity,
            noise,
            loaded_at: Utc::now(),
            load_time: started.elapsed(),
        })
    }

    /// The compiled-in default rules
    pub fn builtin() -> Self {
        Self::from_json(DEFAULT_RULES).expect("default rule set must compile")
    }

    /// Category for a field path.
    ///
    /// The first matching prefix rule wins; `{next}` in a rule's category is
    /// substituted with the path segment following the prefix. Falls back to
    /// the first path segment.
    pub fn categorize(&self, path: &[String]) -> String {
        for rule in &self.categories {
            if path.len() >= rule.prefix.len()
                && path[..rule.prefix.len()] == rule.prefix[..]
            {
                if let Some(placeholder) = rule.category.find("{next}") {
                    let next = match path.get(rule.prefix.len()) {
                        Some(segment) => segment.as_str(),
                        None => continue,
                    };
                    let mut category = String::with_capacity(rule.category.len() + next.len());
                    category.push_str(&rule.category[..placeholder]);
                    category.push_str(next);
                    category.push_str(&rule.category[placeholder + "{next}".len()..]);
                    return category;
                }
                return rule.category.clone();
            }
        }

        path.first().cloned().unwrap_or_else(|| "general".to_string())
    }

    /// Severity for a change: first matching pattern wins
    pub fn severity(&self, field_path: &str, change_type: ChangeType) -> Severity {
        for rule in &self.severities {
            if let Some(required) = rule.diff_type {
                if required != change_type {
                    continue;
                }
            }
            if rule.pattern.is_match(field_path) {
                return rule.severity;
            }
        }
        self.default_severity
    }

    /// Whether a field path matches a configured noise pattern
    pub fn is_noise(&self, field_path: &str) -> bool {
        self.noise.iter().any(|p| p.is_match(field_path))
    }
}

/// Shared rule store with atomic reload
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
    path: Option<PathBuf>,
}

impl RuleStore {
    /// Create a store, loading the file at `path` or the built-in defaults
    pub fn new(path: Option<String>) -> Result<Self, RuleError> {
        let path = path.map(PathBuf::from);
        let rules = match &path {
            Some(p) => Arc::new(RuleSet::from_json(&std::fs::read_to_string(p)?)?),
            None => Arc::clone(&BUILTIN_RULES),
        };

        tracing::info!(
            load_ms = rules.load_time.as_millis() as u64,
            source = %path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "builtin".to_string()),
            "diff rules loaded"
        );

        Ok(Self {
            current: RwLock::new(rules),
            path,
        })
    }

    /// Current rule set snapshot
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }

    /// Re-read the rule file and swap the compiled set atomically.
    ///
    /// Readers holding an older snapshot finish their run on it; a malformed
    /// file leaves the current set in place.
    pub fn reload(&self) -> Result<(), RuleError> {
        let rules = match &self.path {
            Some(p) => RuleSet::from_json(&std::fs::read_to_string(p)?)?,
            None => RuleSet::builtin(),
        };

        tracing::info!(
            load_ms = rules.load_time.as_millis() as u64,
            "diff rules reloaded"
        );

        *self.current.write() = Arc::new(rules);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_compiles() {
        let rules = RuleSet::builtin();
        assert!(!rules.categories.is_empty());
        assert!(!rules.noise.is_empty());
    }

    #[test]
    fn test_default_categories() {
        let rules = RuleSet::builtin();
        assert_eq!(
            rules.categorize(&path(&["facts", "modules", "mail", "version"])),
            "modules"
        );
        assert_eq!(
            rules.categorize(&path(&["facts", "distro", "version"])),
            "operating_system"
        );
        assert_eq!(
            rules.categorize(&path(&["facts", "memory", "total"])),
            "hardware"
        );
        assert_eq!(
            rules.categorize(&path(&["facts", "network", "eth0"])),
            "network"
        );
    }

    #[test]
    fn test_feature_category_substitution() {
        let rules = RuleSet::builtin();
        assert_eq!(
            rules.categorize(&path(&["facts", "features", "backup", "enabled"])),
            "features_backup"
        );
        // No segment after the prefix: fall through to the first segment
        assert_eq!(rules.categorize(&path(&["facts", "features"])), "facts");
    }

    #[test]
    fn test_category_falls_back_to_first_segment() {
        let rules = RuleSet::builtin();
        assert_eq!(rules.categorize(&path(&["installation", "id"])), "installation");
    }

    #[test]
    fn test_default_severities() {
        let rules = RuleSet::builtin();
        assert_eq!(
            rules.severity("facts.distro.version", ChangeType::Update),
            Severity::High
        );
        assert_eq!(
            rules.severity("facts.modules.mail", ChangeType::Delete),
            Severity::Critical
        );
        assert_eq!(
            rules.severity("facts.memory.free_mb", ChangeType::Update),
            Severity::Low
        );
        assert_eq!(
            rules.severity("facts.product.name", ChangeType::Update),
            Severity::Medium
        );
    }

    #[test]
    fn test_severity_respects_diff_type() {
        let rules = RuleSet::builtin();
        // The distro rule only applies to updates
        assert_eq!(
            rules.severity("facts.distro.codename", ChangeType::Create),
            Severity::Medium
        );
    }

    #[test]
    fn test_noise_patterns() {
        let rules = RuleSet::builtin();
        assert!(rules.is_noise("facts.network.eth0.rx_bytes"));
        assert!(rules.is_noise("facts.uptime"));
        assert!(rules.is_noise("facts.last_seen"));
        assert!(!rules.is_noise("facts.distro.version"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_reload_swaps_atomically() {
        let store = RuleStore::new(None).unwrap();
        let before = store.snapshot();
        store.reload().unwrap();
        let after = store.snapshot();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        assert!(RuleSet::from_json("{not json").is_err());
        assert!(RuleSet::from_json(r#"{"severities":[{"pattern":"(", "severity":"low"}]}"#).is_err());
        assert!(
            RuleSet::from_json(r#"{"severities":[{"pattern":"x", "severity":"fatal"}]}"#).is_err()
        );
    }
}
