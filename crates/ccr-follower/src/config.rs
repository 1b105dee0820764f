//! Follower configuration files.
//!
//! A config file carries the replication settings and the autofollow rules to run.
//! TOML and JSON are accepted, chosen by file extension.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::cluster::RoleMapping;
use crate::error::FollowerError;
use crate::pattern::IndexPattern;
use crate::settings::ReplicationSettings;

/// A named rule that starts replication for matching leader indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFollowRule {
    /// Rule name, unique per follower cluster.
    pub name: String,
    /// Alias of the leader cluster.
    pub leader_alias: String,
    /// Leader index expression, e.g. `logs-*,-logs-tmp*`.
    pub pattern: String,
    /// Roles the started jobs run under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_roles: Option<RoleMapping>,
    /// Settings applied to every follower index the rule creates.
    #[serde(default)]
    pub index_settings: BTreeMap<String, String>,
}

impl AutoFollowRule {
    /// Create a rule without roles or index settings.
    pub fn new(
        name: impl Into<String>,
        leader_alias: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            leader_alias: leader_alias.into(),
            pattern: pattern.into(),
            use_roles: None,
            index_settings: BTreeMap::new(),
        }
    }

    /// Parse the rule's index expression.
    pub fn index_pattern(&self) -> Result<IndexPattern, FollowerError> {
        IndexPattern::parse(&self.pattern)
    }

    /// Check the rule is usable.
    pub fn validate(&self) -> Result<(), FollowerError> {
        if self.name.trim().is_empty() {
            return Err(FollowerError::Config {
                msg: "autofollow rule name must not be empty".to_string(),
            });
        }
        if self.leader_alias.trim().is_empty() {
            return Err(FollowerError::Config {
                msg: format!("rule '{}' has no leader_alias", self.name),
            });
        }
        self.index_pattern()?;
        Ok(())
    }
}

/// Top-level follower configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerConfig {
    /// Replication settings.
    #[serde(default)]
    pub settings: ReplicationSettings,
    /// Autofollow rules.
    #[serde(default)]
    pub rules: Vec<AutoFollowRule>,
}

impl FollowerConfig {
    /// Load from a `.toml` or `.json` file and validate.
    pub fn from_file(path: &Path) -> Result<Self, FollowerError> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: FollowerConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                return Err(FollowerError::Config {
                    msg: format!("unsupported config file extension: '{}'", ext),
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check settings and rules; rule names must be unique.
    pub fn validate(&self) -> Result<(), FollowerError> {
        self.settings.validate()?;
        let mut names = BTreeSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !names.insert(rule.name.as_str()) {
                return Err(FollowerError::Config {
                    msg: format!("duplicate autofollow rule name '{}'", rule.name),
                });
            }
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, FollowerError> {
        toml::to_string_pretty(self).map_err(|e| FollowerError::Config { msg: e.to_string() })
    }
}
