//! Static converter configuration.
//!
//! Affix templates per node type, group-name merge rules and anatomical region
//! token lists, loaded from JSON. Every section is optional; the default
//! configuration has empty tables and is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    Missing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Converter configuration tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// NodeType name (`"SKIN"`, `"CLOTH_SIM"`, ...) to affix text template.
    pub affixes: BTreeMap<String, String>,
    /// Group-name merge rules, applied in order.
    pub grouping: Vec<GroupingRule>,
    pub regions: RegionRules,
}

/// Rewrites a group name containing `pattern`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupingRule {
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip: Option<String>,
}

impl GroupingRule {
    fn apply(&self, name: &str) -> String {
        if self.pattern.is_empty() || !name.contains(&self.pattern) {
            return name.to_string();
        }
        let mut out = name.to_string();
        if let Some((from, to)) = &self.replace {
            if !from.is_empty() {
                out = out.replace(from.as_str(), to);
            }
        }
        if let Some(token) = &self.strip {
            if !token.is_empty() {
                out = out.replace(token.as_str(), "");
            }
        }
        out
    }
}

/// Token lists for region speculation. Tokens compare case-insensitively
/// against the `_`-separated parts of a node name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionRules {
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub center: Vec<String>,
    pub exceptions: Vec<String>,
}

/// Anatomical side of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Left,
    Right,
    Center,
}

impl Region {
    pub fn as_str(self) -> &'static str {
        match self {
            Region::Left => "left",
            Region::Right => "right",
            Region::Center => "center",
        }
    }
}

impl ConverterConfig {
    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::info!(
            "Loaded config {}: {} affix templates, {} grouping rules",
            path.display(),
            config.affixes.len(),
            config.grouping.len()
        );
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Affix text for a node type with `{name}` and `{group}` substituted.
    pub fn render_affixes(&self, type_name: &str, name: &str, group: &str) -> Option<String> {
        self.affixes
            .get(type_name)
            .map(|t| t.replace("{name}", name).replace("{group}", group))
    }

    /// Apply every matching grouping rule in order.
    pub fn apply_grouping(&self, group: &str) -> String {
        self.grouping
            .iter()
            .fold(group.to_string(), |name, rule| rule.apply(&name))
    }

    /// Guess the anatomical region of a node from its name.
    pub fn speculate_region(&self, name: &str) -> Option<Region> {
        let lower = name.to_lowercase();
        let parts: Vec<&str> = lower.split('_').filter(|p| !p.is_empty()).collect();
        let hit = |tokens: &[String]| {
            tokens
                .iter()
                .any(|t| parts.iter().any(|p| p.eq_ignore_ascii_case(t)))
        };

        if hit(&self.regions.exceptions) {
            return None;
        }
        if hit(&self.regions.left) {
            Some(Region::Left)
        } else if hit(&self.regions.right) {
            Some(Region::Right)
        } else if hit(&self.regions.center) {
            Some(Region::Center)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConverterConfig {
        ConverterConfig::from_json(
            r#"{
                "affixes": {"SKIN": "skin {name} in {group}"},
                "grouping": [
                    {"match": "pad", "replace": ["pad", "armor"]},
                    {"match": "_alt", "strip": "_alt"}
                ],
                "regions": {
                    "left": ["l", "left"],
                    "right": ["r", "right"],
                    "center": ["spine", "head"],
                    "exceptions": ["lod"]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_partial_config_accepted() {
        let config = ConverterConfig::from_json(r#"{"affixes": {"BONE": "b"}}"#).unwrap();
        assert_eq!(config.affixes.len(), 1);
        assert!(config.grouping.is_empty());
        assert!(config.regions.left.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let result = ConverterConfig::load("/nonexistent/usfconv.json");
        assert!(matches!(result, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_render_affixes() {
        let config = sample();
        assert_eq!(
            config.render_affixes("SKIN", "Body", "body").as_deref(),
            Some("skin Body in body")
        );
        assert_eq!(config.render_affixes("BONE", "x", "x"), None);
    }

    #[test]
    fn test_grouping_rules() {
        let config = sample();
        assert_eq!(config.apply_grouping("shoulder_pad"), "shoulder_armor");
        assert_eq!(config.apply_grouping("helmet_alt"), "helmet");
        assert_eq!(config.apply_grouping("boots"), "boots");
    }

    #[test]
    fn test_region_speculation() {
        let config = sample();
        assert_eq!(config.speculate_region("Shoulder_L_sim"), Some(Region::Left));
        assert_eq!(config.speculate_region("arm_right"), Some(Region::Right));
        assert_eq!(config.speculate_region("Spine_01"), Some(Region::Center));
        assert_eq!(config.speculate_region("Shoulder_L_lod1"), Some(Region::Left));
        assert_eq!(config.speculate_region("arm_l_lod"), None);
        assert_eq!(config.speculate_region("helmet"), None);
    }
}
