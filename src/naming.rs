//! Pipeline name derivation.
//!
//! A name is built from the subfolder leaf, optionally prefixed with the
//! repository name and the parent folder, and finally wrapped with a routing
//! token (branch route for pushes, pull-request route for pull requests).

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{Result, WebhookError};
use crate::subfolder::{ServiceModel, SubfolderSet};

/// Where a routing token goes relative to the base name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    Prefix,
    Postfix,
    #[default]
    None,
}

impl RouteMode {
    /// Anything other than `prefix` or `postfix` disables routing.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "prefix" => RouteMode::Prefix,
            "postfix" => RouteMode::Postfix,
            _ => RouteMode::None,
        }
    }
}

/// Identifier sent to the pipeline-control service. Never empty, never
/// contains `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PipelineName(String);

impl PipelineName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(WebhookError::MalformedPayload(format!(
                "invalid pipeline name '{}'",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PipelineName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NamingOptions {
    pub model: Option<ServiceModel>,
    pub prefix_repo: bool,
    pub prefix_parent: bool,
}

/// Routing applied to one delivery. Push and pull-request events each bring
/// their own mode and token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Routing<'a> {
    pub mode: RouteMode,
    pub token: Option<&'a str>,
}

impl<'a> Routing<'a> {
    pub fn new(mode: RouteMode, token: Option<&'a str>) -> Self {
        Self { mode, token }
    }

    fn wrap(&self, base: String) -> String {
        match (self.mode, self.token) {
            (RouteMode::Prefix, Some(token)) => format!("{}-{}", token, base),
            (RouteMode::Postfix, Some(token)) => format!("{}-{}", base, token),
            _ => base,
        }
    }
}

/// Derives the pipeline name for one subfolder identifier.
pub fn pipeline_name(
    subfolder: &str,
    repository: &str,
    options: &NamingOptions,
    routing: &Routing<'_>,
) -> String {
    let parent = match options.model {
        Some(model) if model.has_parent() => subfolder.split_once('/').map(|(parent, _)| parent),
        _ => None,
    };
    let leaf = subfolder.rsplit('/').next().unwrap_or(subfolder);

    let repo_prefix = if options.prefix_repo {
        format!("{}-", repository)
    } else {
        String::new()
    };
    let parent_prefix = match parent {
        Some(parent) if options.prefix_parent && !parent.is_empty() => format!("{}-", parent),
        _ => String::new(),
    };

    routing.wrap(format!("{}{}{}", repo_prefix, parent_prefix, leaf))
}

/// Derives one pipeline name per subfolder. Duplicates are kept: two
/// subfolders with the same leaf legitimately map to the same pipeline.
pub fn build_pipeline_names(
    subfolders: &SubfolderSet,
    repository: &str,
    options: &NamingOptions,
    routing: &Routing<'_>,
) -> Result<Vec<PipelineName>> {
    let names = subfolders
        .iter()
        .map(|s| PipelineName::new(pipeline_name(s, repository, options, routing)))
        .collect::<Result<Vec<_>>>()?;
    debug!("Pipeline names: {:?}", names);
    Ok(names)
}
