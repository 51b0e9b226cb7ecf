//! Branch routing: which branches the webhook acts on, and which routing token
//! each one contributes to pipeline names.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::{Result, WebhookError};

pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Value attached to a branch in a route map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BranchValue {
    Enabled(bool),
    Token(String),
}

/// The configured allow-set of branches.
///
/// Decoded once when configuration is loaded. A single branch name is stored as
/// a one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawBranches")]
pub enum AllowedBranches {
    List(Vec<String>),
    Routes(BTreeMap<String, BranchValue>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBranches {
    Single(String),
    List(Vec<String>),
    Routes(BTreeMap<String, BranchValue>),
}

impl From<RawBranches> for AllowedBranches {
    fn from(raw: RawBranches) -> Self {
        match raw {
            RawBranches::Single(name) => AllowedBranches::List(vec![name]),
            RawBranches::List(names) => AllowedBranches::List(names),
            RawBranches::Routes(map) => AllowedBranches::Routes(map),
        }
    }
}

/// Result of a successful branch match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchRoute {
    /// Branch is allowed and carries no token.
    Plain,
    Token(String),
}

impl BranchRoute {
    pub fn token(&self) -> Option<&str> {
        match self {
            BranchRoute::Plain => None,
            BranchRoute::Token(token) => Some(token),
        }
    }
}

impl AllowedBranches {
    /// Parses the environment form: a JSON list, a JSON object, a JSON string,
    /// or a bare branch name.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(WebhookError::ConfigError(
                "BRANCH_ROUTES must name at least one branch".to_string(),
            ));
        }
        if raw.starts_with('[') || raw.starts_with('{') || raw.starts_with('"') {
            return serde_json::from_str(raw).map_err(|e| {
                WebhookError::ConfigError(format!("Failed to parse BRANCH_ROUTES '{}': {}", raw, e))
            });
        }
        Ok(AllowedBranches::List(vec![raw.to_string()]))
    }

    /// Routing tokens configured across all branches.
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            AllowedBranches::List(_) => Vec::new(),
            AllowedBranches::Routes(map) => map
                .values()
                .filter_map(|v| match v {
                    BranchValue::Token(t) => Some(t.as_str()),
                    BranchValue::Enabled(_) => None,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AllowedBranches::List(names) => names.is_empty(),
            AllowedBranches::Routes(map) => map.is_empty(),
        }
    }

    /// Matches `branch_ref` (e.g. `refs/heads/master`) against every configured
    /// branch by exact string equality.
    pub fn route(&self, branch_ref: &str) -> Result<BranchRoute> {
        let matches = |branch: &str| {
            branch_ref
                .strip_prefix(BRANCH_REF_PREFIX)
                .is_some_and(|name| name == branch)
        };

        let found = match self {
            AllowedBranches::List(names) => names
                .iter()
                .find(|b| matches(b.as_str()))
                .map(|b| (b.as_str(), BranchRoute::Plain)),
            AllowedBranches::Routes(map) => {
                map.iter().find(|(b, _)| matches(b.as_str())).map(|(b, v)| {
                    let route = match v {
                        BranchValue::Enabled(_) => BranchRoute::Plain,
                        BranchValue::Token(t) => BranchRoute::Token(t.clone()),
                    };
                    (b.as_str(), route)
                })
            }
        };

        match found {
            Some((branch, route)) => {
                info!("Target branch: {}", branch);
                Ok(route)
            }
            None => Err(WebhookError::NotListening {
                branch_ref: branch_ref.to_string(),
            }),
        }
    }
}
