use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AppError, AppResult, SETTINGS_INVALID};

pub const ENV_IGNORE_ACL: &str = "SITECATALOG_IGNORE_ACL";
pub const ENV_IGNORE_SITE_LIMITATIONS: &str = "SITECATALOG_IGNORE_SITE_LIMITATIONS";
pub const ENV_ORPHAN_POLICY: &str = "SITECATALOG_ORPHAN_POLICY";

/// What the tree sorter does with categories whose parent is not in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Emit them after the rooted tree, as extra roots in display order.
    #[default]
    TreatAsRoot,
    /// Leave them, and everything beneath them, out of the result.
    Drop,
}

impl OrphanPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrphanPolicy::TreatAsRoot => "treat_as_root",
            OrphanPolicy::Drop => "drop",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid orphan policy: {value}")]
pub struct OrphanPolicyParseError {
    value: String,
}

impl OrphanPolicyParseError {
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FromStr for OrphanPolicy {
    type Err = OrphanPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "treat_as_root" => Ok(OrphanPolicy::TreatAsRoot),
            "drop" => Ok(OrphanPolicy::Drop),
            other => Err(OrphanPolicyParseError {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_breadcrumb_separator() -> String {
    ">>".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub ignore_acl: bool,
    pub ignore_site_limitations: bool,
    pub orphan_policy: OrphanPolicy,
    #[serde(default = "default_breadcrumb_separator")]
    pub breadcrumb_separator: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            ignore_acl: false,
            ignore_site_limitations: false,
            orphan_policy: OrphanPolicy::default(),
            breadcrumb_separator: default_breadcrumb_separator(),
        }
    }
}

fn parse_flag(name: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::new(SETTINGS_INVALID, "Expected a boolean flag")
            .with_context("variable", name.to_string())
            .with_context("value", value.to_string())),
    }
}

impl CatalogSettings {
    /// Reads settings from an optional JSON file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::from(err).with_context("path", path.display().to_string())
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            AppError::new(SETTINGS_INVALID, "Settings file is not valid")
                .with_context("path", path.display().to_string())
                .with_cause(err)
        })
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides<F>(mut self, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_IGNORE_ACL) {
            self.ignore_acl = parse_flag(ENV_IGNORE_ACL, &value)?;
        }
        if let Some(value) = lookup(ENV_IGNORE_SITE_LIMITATIONS) {
            self.ignore_site_limitations = parse_flag(ENV_IGNORE_SITE_LIMITATIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_ORPHAN_POLICY) {
            self.orphan_policy = value.parse().map_err(|err: OrphanPolicyParseError| {
                AppError::new(SETTINGS_INVALID, err.to_string())
                    .with_context("variable", ENV_ORPHAN_POLICY)
                    .with_context("value", err.value().to_string())
            })?;
        }
        Ok(self)
    }
}
