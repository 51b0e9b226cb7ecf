//! Webhook configuration.
//!
//! Settings come either from environment variables (the historical
//! deployment form) or from a TOML file named by `WEBHOOK_CONFIG`. They are
//! loaded again for every delivery.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::branch::{AllowedBranches, BranchRoute};
use crate::error::{Result, WebhookError};
use crate::event::EventKind;
use crate::naming::{NamingOptions, RouteMode, Routing};
use crate::subfolder::ServiceModel;

pub const CONFIG_PATH_ENV: &str = "WEBHOOK_CONFIG";

pub const ENV_WEBHOOK_SECRET: &str = "GITHUB_WEBHOOK_SECRET";
pub const ENV_BRANCH_ROUTES: &str = "BRANCH_ROUTES";
pub const ENV_SERVICE_MODEL: &str = "PROJECT_SERVICE_MODEL";
pub const ENV_PREFIX_REPO: &str = "PROJECT_PREFIX_REPO";
pub const ENV_PREFIX_PARENT: &str = "PROJECT_PREFIX_PARENT";
pub const ENV_BRANCH_ROUTE: &str = "BRANCH_ROUTE";
pub const ENV_PULL_REQUEST_ROUTE: &str = "PULL_REQUEST_ROUTE";
pub const ENV_PULL_REQUEST_ROUTING: &str = "PULL_REQUEST_ROUTING";
pub const ENV_ACCESS_TOKEN: &str = "GITHUB_ACCESS_TOKEN";
pub const ENV_OFFLINE: &str = "OFFLINE";

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub webhook_secret: String,
    pub branches: AllowedBranches,
    /// `None` when unset or unrecognised; no subfolders can be derived then.
    pub service_model: Option<ServiceModel>,
    pub prefix_repo: bool,
    pub prefix_parent: bool,
    /// Routing mode applied to push events with the branch's token.
    pub branch_route: RouteMode,
    pub pull_request_route: RouteMode,
    pub pull_request_routing: Option<String>,
    pub github_access_token: Option<String>,
    /// Derive pipeline names without calling the pipeline-control service.
    pub offline: bool,
}

/// TOML form of [`WebhookConfig`].
#[derive(Debug, Deserialize)]
struct ConfigFile {
    webhook_secret: String,
    branch_routes: AllowedBranches,
    service_model: Option<String>,
    #[serde(default)]
    prefix_repo: bool,
    #[serde(default)]
    prefix_parent: bool,
    branch_route: Option<String>,
    pull_request_route: Option<String>,
    pull_request_routing: Option<String>,
    github_access_token: Option<String>,
    #[serde(default)]
    offline: bool,
}

fn parse_flag(raw: Option<String>) -> bool {
    raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn parse_model(raw: Option<&str>) -> Option<ServiceModel> {
    let raw = raw?;
    match raw.parse() {
        Ok(model) => Some(model),
        Err(e) => {
            warn!("{}; no subfolders will be resolved", e);
            None
        }
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|v| !v.trim().is_empty())
}

fn check_token(kind: &str, token: &str) -> Result<()> {
    if token.is_empty() || token.contains('/') {
        return Err(WebhookError::ConfigError(format!(
            "{} token '{}' must be non-empty and must not contain '/'",
            kind, token
        )));
    }
    Ok(())
}

impl WebhookConfig {
    /// Reads configuration through `lookup`, which maps a key to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let webhook_secret = lookup(ENV_WEBHOOK_SECRET).ok_or_else(|| {
            WebhookError::ConfigError(format!("{} is not set", ENV_WEBHOOK_SECRET))
        })?;
        let branches = lookup(ENV_BRANCH_ROUTES)
            .ok_or_else(|| WebhookError::ConfigError(format!("{} is not set", ENV_BRANCH_ROUTES)))
            .and_then(|raw| AllowedBranches::parse(&raw))?;

        let config = Self {
            webhook_secret,
            branches,
            service_model: parse_model(lookup(ENV_SERVICE_MODEL).as_deref()),
            prefix_repo: parse_flag(lookup(ENV_PREFIX_REPO)),
            prefix_parent: parse_flag(lookup(ENV_PREFIX_PARENT)),
            branch_route: lookup(ENV_BRANCH_ROUTE)
                .map(|v| RouteMode::parse(&v))
                .unwrap_or_default(),
            pull_request_route: lookup(ENV_PULL_REQUEST_ROUTE)
                .map(|v| RouteMode::parse(&v))
                .unwrap_or_default(),
            pull_request_routing: non_empty(lookup(ENV_PULL_REQUEST_ROUTING)),
            github_access_token: non_empty(lookup(ENV_ACCESS_TOKEN)),
            offline: parse_flag(lookup(ENV_OFFLINE)),
        };
        config.validate()
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let config = Self {
            webhook_secret: file.webhook_secret,
            branches: file.branch_routes,
            service_model: parse_model(file.service_model.as_deref()),
            prefix_repo: file.prefix_repo,
            prefix_parent: file.prefix_parent,
            branch_route: file
                .branch_route
                .map(|v| RouteMode::parse(&v))
                .unwrap_or_default(),
            pull_request_route: file
                .pull_request_route
                .map(|v| RouteMode::parse(&v))
                .unwrap_or_default(),
            pull_request_routing: non_empty(file.pull_request_routing),
            github_access_token: non_empty(file.github_access_token),
            offline: file.offline,
        };
        config.validate()
    }

    /// Load and parse a TOML configuration file
    pub async fn from_toml_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            WebhookError::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            WebhookError::ConfigError(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    fn validate(self) -> Result<Self> {
        if self.webhook_secret.is_empty() {
            return Err(WebhookError::ConfigError(
                "webhook secret must not be empty".to_string(),
            ));
        }
        if self.branches.is_empty() {
            return Err(WebhookError::ConfigError(
                "at least one branch must be configured".to_string(),
            ));
        }
        for token in self.branches.tokens() {
            check_token("branch route", token)?;
        }
        if let Some(token) = &self.pull_request_routing {
            check_token("pull request route", token)?;
        }
        Ok(self)
    }

    pub fn naming_options(&self) -> NamingOptions {
        NamingOptions {
            model: self.service_model,
            prefix_repo: self.prefix_repo,
            prefix_parent: self.prefix_parent,
        }
    }

    /// Routing for a delivery of `kind`. Pushes use the matched branch's token,
    /// pull requests the configured pull-request token.
    pub fn routing_for<'a>(&'a self, kind: EventKind, branch_route: &'a BranchRoute) -> Routing<'a> {
        match kind {
            EventKind::PullRequest => Routing::new(
                self.pull_request_route,
                self.pull_request_routing.as_deref(),
            ),
            _ => Routing::new(self.branch_route, branch_route.token()),
        }
    }
}

/// Where configuration is read from on each delivery.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Environment,
    File(PathBuf),
    Static(Box<WebhookConfig>),
}

impl ConfigSource {
    /// `File` when `WEBHOOK_CONFIG` is set, otherwise `Environment`.
    pub fn detect() -> Self {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => ConfigSource::File(PathBuf::from(path)),
            _ => ConfigSource::Environment,
        }
    }

    pub async fn load(&self) -> Result<WebhookConfig> {
        match self {
            ConfigSource::Environment => WebhookConfig::from_env(),
            ConfigSource::File(path) => WebhookConfig::from_toml_file(path).await,
            ConfigSource::Static(config) => Ok(config.as_ref().clone()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ConfigSource::Environment => "environment".to_string(),
            ConfigSource::File(path) => path.display().to_string(),
            ConfigSource::Static(_) => "static".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_environment_keys() {
        let config = WebhookConfig::from_lookup(lookup_from(&[
            (ENV_WEBHOOK_SECRET, "s3cret"),
            (ENV_BRANCH_ROUTES, r#"{"master": "prod"}"#),
            (ENV_SERVICE_MODEL, "nested"),
            (ENV_PREFIX_REPO, "true"),
            (ENV_PREFIX_PARENT, "TRUE"),
            (ENV_BRANCH_ROUTE, "prefix"),
            (ENV_PULL_REQUEST_ROUTE, "postfix"),
            (ENV_PULL_REQUEST_ROUTING, "pr"),
            (ENV_ACCESS_TOKEN, "ghp_x"),
        ]))
        .unwrap();

        assert_eq!(config.webhook_secret, "s3cret");
        assert_eq!(config.service_model, Some(ServiceModel::Nested));
        assert!(config.prefix_repo);
        assert!(config.prefix_parent);
        assert_eq!(config.branch_route, RouteMode::Prefix);
        assert_eq!(config.pull_request_route, RouteMode::Postfix);
        assert_eq!(config.pull_request_routing.as_deref(), Some("pr"));
        assert_eq!(config.github_access_token.as_deref(), Some("ghp_x"));
        assert!(!config.offline);
    }

    #[test]
    fn defaults_are_off() {
        let config = WebhookConfig::from_lookup(lookup_from(&[
            (ENV_WEBHOOK_SECRET, "s"),
            (ENV_BRANCH_ROUTES, "master"),
            (ENV_BRANCH_ROUTE, "false"),
        ]))
        .unwrap();
        assert_eq!(config.branches, AllowedBranches::List(vec!["master".into()]));
        assert_eq!(config.service_model, None);
        assert!(!config.prefix_repo);
        assert_eq!(config.branch_route, RouteMode::None);
        assert_eq!(config.pull_request_route, RouteMode::None);
        assert!(config.github_access_token.is_none());
    }

    #[test]
    fn unknown_model_is_accepted_as_unset() {
        let config = WebhookConfig::from_lookup(lookup_from(&[
            (ENV_WEBHOOK_SECRET, "s"),
            (ENV_BRANCH_ROUTES, "master"),
            (ENV_SERVICE_MODEL, "flat"),
        ]))
        .unwrap();
        assert_eq!(config.service_model, None);
    }

    #[test]
    fn missing_required_keys() {
        let err = WebhookConfig::from_lookup(lookup_from(&[(ENV_BRANCH_ROUTES, "master")]))
            .unwrap_err();
        assert!(matches!(err, WebhookError::ConfigError(_)));

        let err = WebhookConfig::from_lookup(lookup_from(&[(ENV_WEBHOOK_SECRET, "s")])).unwrap_err();
        assert!(matches!(err, WebhookError::ConfigError(_)));
    }

    #[test]
    fn rejects_tokens_with_separators() {
        let err = WebhookConfig::from_lookup(lookup_from(&[
            (ENV_WEBHOOK_SECRET, "s"),
            (ENV_BRANCH_ROUTES, r#"{"master": "prod/eu"}"#),
        ]))
        .unwrap_err();
        assert!(matches!(err, WebhookError::ConfigError(_)));

        let err = WebhookConfig::from_lookup(lookup_from(&[
            (ENV_WEBHOOK_SECRET, "s"),
            (ENV_BRANCH_ROUTES, "master"),
            (ENV_PULL_REQUEST_ROUTING, "a/b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, WebhookError::ConfigError(_)));
    }

    #[test]
    fn push_and_pull_request_routing_are_separate() {
        let config = WebhookConfig::from_lookup(lookup_from(&[
            (ENV_WEBHOOK_SECRET, "s"),
            (ENV_BRANCH_ROUTES, r#"{"master": "prod"}"#),
            (ENV_BRANCH_ROUTE, "prefix"),
            (ENV_PULL_REQUEST_ROUTE, "postfix"),
            (ENV_PULL_REQUEST_ROUTING, "pr"),
        ]))
        .unwrap();
        let route = BranchRoute::Token("prod".into());

        let push = config.routing_for(EventKind::Push, &route);
        assert_eq!((push.mode, push.token), (RouteMode::Prefix, Some("prod")));

        let pr = config.routing_for(EventKind::PullRequest, &route);
        assert_eq!((pr.mode, pr.token), (RouteMode::Postfix, Some("pr")));
    }

    #[test]
    fn parses_toml() {
        let config = WebhookConfig::from_toml_str(
            r#"
            webhook_secret = "s3cret"
            service_model = "split"
            prefix_repo = true
            branch_route = "postfix"

            [branch_routes]
            master = "prod"
            develop = true
            "#,
        )
        .unwrap();
        assert_eq!(config.service_model, Some(ServiceModel::Split));
        assert!(config.prefix_repo);
        assert!(!config.prefix_parent);
        assert_eq!(config.branch_route, RouteMode::Postfix);
        assert_eq!(
            config.branches.route("refs/heads/develop").unwrap(),
            BranchRoute::Plain
        );
    }

    #[test]
    fn toml_accepts_branch_list_and_single_name() {
        let list = WebhookConfig::from_toml_str(
            "webhook_secret = \"s\"\nbranch_routes = [\"master\", \"main\"]\n",
        )
        .unwrap();
        assert_eq!(
            list.branches,
            AllowedBranches::List(vec!["master".into(), "main".into()])
        );

        let single =
            WebhookConfig::from_toml_str("webhook_secret = \"s\"\nbranch_routes = \"master\"\n")
                .unwrap();
        assert_eq!(single.branches, AllowedBranches::List(vec!["master".into()]));
    }

    #[tokio::test]
    async fn loads_from_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "webhook_secret = \"s\"").unwrap();
        writeln!(file, "branch_routes = [\"master\"]").unwrap();
        writeln!(file, "offline = true").unwrap();

        let source = ConfigSource::File(file.path().to_path_buf());
        let config = source.load().await.unwrap();
        assert!(config.offline);
    }

    #[tokio::test]
    async fn missing_file_is_config_error() {
        let source = ConfigSource::File(PathBuf::from("/nonexistent/webhook.toml"));
        assert!(matches!(
            source.load().await.unwrap_err(),
            WebhookError::ConfigError(_)
        ));
    }
}
