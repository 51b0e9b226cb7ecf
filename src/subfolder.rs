//! Mapping of changed file paths to subproject identifiers.
//!
//! How a path's directory components become an identifier depends on the
//! repository layout, selected by [`ServiceModel`]:
//!
//! | model    | components used                | `a/b/c.py` |
//! |----------|--------------------------------|------------|
//! | split    | first                          | `a`        |
//! | nested   | all but the last               | `a/b`      |
//! | combined | all, cut at the first `.`      | `a/b/c`    |
//! | full     | second up to (not incl.) last  | `b`        |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{Result, WebhookError};

/// Distinct subproject identifiers touched by a change.
pub type SubfolderSet = BTreeSet<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceModel {
    Split,
    Nested,
    Combined,
    Full,
}

impl ServiceModel {
    pub const ALL: [ServiceModel; 4] = [
        ServiceModel::Split,
        ServiceModel::Nested,
        ServiceModel::Combined,
        ServiceModel::Full,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceModel::Split => "split",
            ServiceModel::Nested => "nested",
            ServiceModel::Combined => "combined",
            ServiceModel::Full => "full",
        }
    }

    /// Whether identifiers produced by this model carry a parent component.
    pub fn has_parent(self) -> bool {
        !matches!(self, ServiceModel::Split)
    }

    /// Component indices kept for a path of `len` components (`len >= 2`).
    fn span(self, len: usize) -> Range<usize> {
        match self {
            ServiceModel::Split => 0..1,
            ServiceModel::Nested => 0..len - 1,
            ServiceModel::Combined => 0..len,
            ServiceModel::Full => 1..len - 1,
        }
    }

    fn truncates_at_dot(self) -> bool {
        matches!(self, ServiceModel::Combined)
    }

    /// Applies the model to one path. Root-level files yield `None`, as does a
    /// rule that leaves no last component (`full` on `a/x.py`, `combined` on
    /// `a/.env`).
    pub fn extract(self, path: &str) -> Option<String> {
        let components: Vec<&str> = path.split('/').collect();
        if components.len() < 2 {
            return None;
        }

        let joined = components[self.span(components.len())].join("/");
        let identifier = if self.truncates_at_dot() {
            joined.split('.').next().unwrap_or_default().to_string()
        } else {
            joined
        };

        // A dotfile under `combined` leaves a trailing `/` and no leaf.
        if identifier.rsplit('/').next().is_none_or(str::is_empty) {
            None
        } else {
            Some(identifier)
        }
    }
}

impl fmt::Display for ServiceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceModel {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self> {
        ServiceModel::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| WebhookError::ConfigError(format!("Unknown service model '{}'", s)))
    }
}

/// Collects the distinct identifiers for `paths` under `model`.
///
/// An unset model contributes nothing, so it fails the same way as a change
/// set with only root-level files.
pub fn resolve_subfolders<S: AsRef<str>>(
    paths: &[S],
    model: Option<ServiceModel>,
) -> Result<SubfolderSet> {
    let subfolders: SubfolderSet = match model {
        Some(model) => paths
            .iter()
            .filter_map(|p| model.extract(p.as_ref()))
            .collect(),
        None => {
            debug!("No service model configured; no subfolders can be derived");
            SubfolderSet::new()
        }
    };

    if subfolders.is_empty() {
        return Err(WebhookError::NoSubfolders);
    }

    info!("Subfolders found: {:?}.", subfolders);
    Ok(subfolders)
}
