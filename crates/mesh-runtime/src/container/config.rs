//! # Mesh Configuration
//!
//! Runtime configuration loaded from environment variables and validated
//! before anything starts.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `DM_DIVISIONS` | (required) | comma-separated division ids served here |
//! | `DM_TRUST` | empty | comma-separated `source>target:action\|action[@endpoint]` |
//! | `DM_WORKERS_PER_DIVISION` | 4 | delivery workers per division |
//! | `DM_DEFAULT_TTL_SECS` | 3600 | TTL for messages built by the runtime |
//! | `DM_MAX_RETRIES` | 3 | retry bound for messages built by the runtime |
//! | `DM_HANDLER_TIMEOUT_SECS` | 30 | per-attempt handler deadline |
//! | `DM_VISIBILITY_TIMEOUT_SECS` | 300 | queue lease length |
//! | `DM_SWEEP_INTERVAL_SECS` | 30 | TTL sweep interval |
//! | `DM_MAX_REQUESTS_PER_MINUTE` | unset | cross-division budget applied to every division |
//! | `DM_REQUIRE_REGISTERED_AGENTS` | false | reject targets missing from the agent registry |
//! | `DM_SHUTDOWN_GRACE_SECS` | 2 | wait for workers after the shutdown signal |

use dm_02_message_router::RouterConfig;
use dm_telemetry::TelemetryConfig;
use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No division to serve.
    #[error("DM_DIVISIONS is empty")]
    NoDivisions,

    /// A variable holds an unparsable value.
    #[error("{var} has an invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// A trust rule does not follow `source>target:actions`.
    #[error("Malformed trust rule {0:?}")]
    MalformedTrust(String),

    /// A division id appears twice.
    #[error("Division {0} listed twice")]
    DuplicateDivision(String),

    /// Router settings out of range.
    #[error("Router configuration: {0}")]
    Router(String),
}

/// One trust relationship to register at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRule {
    /// Division sending the messages.
    pub source: String,
    /// Division receiving them.
    pub target: String,
    /// Actions granted.
    pub actions: Vec<String>,
    /// Gateway endpoint of the target.
    pub endpoint: String,
}

impl FromStr for TrustRule {
    type Err = ConfigError;

    /// Parse `source>target:action|action[@endpoint]`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigError::MalformedTrust(raw.to_string());

        let (rule, endpoint) = match raw.split_once('@') {
            Some((rule, endpoint)) => (rule, Some(endpoint.trim())),
            None => (raw, None),
        };
        let (pair, actions) = rule.split_once(':').ok_or_else(malformed)?;
        let (source, target) = pair.split_once('>').ok_or_else(malformed)?;
        let (source, target) = (source.trim(), target.trim());

        let actions: Vec<String> = actions
            .split('|')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();

        if source.is_empty() || target.is_empty() || actions.is_empty() {
            return Err(malformed());
        }
        if endpoint.is_some_and(str::is_empty) {
            return Err(malformed());
        }

        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            endpoint: endpoint
                .map(str::to_string)
                .unwrap_or_else(|| format!("local://{target}")),
            actions,
        })
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Divisions whose queues this runtime serves.
    pub divisions: Vec<String>,
    /// Trust relationships registered at startup.
    pub trust: Vec<TrustRule>,
    /// Cross-division request budget applied to every served division.
    pub max_requests_per_minute: Option<u64>,
    /// Reject messages whose target agent is not registered.
    pub require_registered_agents: bool,
    /// Wait for workers after the shutdown signal.
    pub shutdown_grace: Duration,
    /// Router settings.
    pub router: RouterConfig,
    /// Logging settings.
    pub telemetry: TelemetryConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            divisions: Vec::new(),
            trust: Vec::new(),
            max_requests_per_minute: None,
            require_registered_agents: false,
            shutdown_grace: Duration::from_secs(2),
            router: RouterConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl MeshConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            telemetry: TelemetryConfig::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(raw) = lookup("DM_DIVISIONS") {
            config.divisions = split_list(&raw).map(str::to_string).collect();
        }
        if let Some(raw) = lookup("DM_TRUST") {
            config.trust = split_list(&raw)
                .map(str::parse)
                .collect::<Result<_, _>>()?;
        }
        if let Some(n) = parse_var(&lookup, "DM_MAX_REQUESTS_PER_MINUTE")? {
            config.max_requests_per_minute = Some(n);
        }
        if let Some(required) = parse_var(&lookup, "DM_REQUIRE_REGISTERED_AGENTS")? {
            config.require_registered_agents = required;
        }
        if let Some(secs) = parse_var(&lookup, "DM_SHUTDOWN_GRACE_SECS")? {
            config.shutdown_grace = Duration::from_secs(secs);
        }

        let router = &mut config.router;
        if let Some(n) = parse_var(&lookup, "DM_WORKERS_PER_DIVISION")? {
            router.workers_per_division = n;
        }
        if let Some(secs) = parse_var(&lookup, "DM_DEFAULT_TTL_SECS")? {
            router.default_ttl_secs = secs;
        }
        if let Some(n) = parse_var(&lookup, "DM_MAX_RETRIES")? {
            router.default_max_retries = n;
        }
        if let Some(secs) = parse_var(&lookup, "DM_HANDLER_TIMEOUT_SECS")? {
            router.handler_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "DM_VISIBILITY_TIMEOUT_SECS")? {
            router.visibility_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "DM_SWEEP_INTERVAL_SECS")? {
            router.sweep_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Check the configuration before start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.divisions.is_empty() {
            return Err(ConfigError::NoDivisions);
        }
        let mut seen = HashSet::new();
        for division in &self.divisions {
            if !seen.insert(division.as_str()) {
                return Err(ConfigError::DuplicateDivision(division.clone()));
            }
        }
        self.router
            .validate()
            .map_err(|e| ConfigError::Router(e.to_string()))
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_trust_rule() {
        let rule: TrustRule = "div-a>div-b:request|event".parse().unwrap();
        assert_eq!(rule.source, "div-a");
        assert_eq!(rule.target, "div-b");
        assert_eq!(rule.actions, vec!["request", "event"]);
        assert_eq!(rule.endpoint, "local://div-b");

        let rule: TrustRule = "div-a > div-b : request @ https://gw.example/b".parse().unwrap();
        assert_eq!(rule.target, "div-b");
        assert_eq!(rule.endpoint, "https://gw.example/b");
    }

    #[test]
    fn test_malformed_trust_rules() {
        for raw in ["div-a:request", "div-a>div-b", ">div-b:request", "div-a>div-b:|", "a>b:request@"] {
            assert!(
                matches!(raw.parse::<TrustRule>(), Err(ConfigError::MalformedTrust(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_from_lookup() {
        let config = MeshConfig::from_lookup(lookup(&[
            ("DM_DIVISIONS", "div-a, div-b,"),
            ("DM_TRUST", "div-a>div-b:request|event,div-b>div-a:response"),
            ("DM_WORKERS_PER_DIVISION", "2"),
            ("DM_HANDLER_TIMEOUT_SECS", "10"),
            ("DM_MAX_REQUESTS_PER_MINUTE", "60"),
            ("DM_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.divisions, vec!["div-a", "div-b"]);
        assert_eq!(config.trust.len(), 2);
        assert_eq!(config.trust[1].actions, vec!["response"]);
        assert_eq!(config.router.workers_per_division, 2);
        assert_eq!(config.router.handler_timeout, Duration::from_secs(10));
        assert_eq!(config.max_requests_per_minute, Some(60));
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_number() {
        let err = MeshConfig::from_lookup(lookup(&[("DM_WORKERS_PER_DIVISION", "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: "DM_WORKERS_PER_DIVISION",
                value: "many".into()
            }
        );
    }

    #[test]
    fn test_validate() {
        assert_eq!(MeshConfig::default().validate(), Err(ConfigError::NoDivisions));

        let config = MeshConfig {
            divisions: vec!["div-a".into(), "div-a".into()],
            ..MeshConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateDivision("div-a".into()))
        );

        let mut config = MeshConfig {
            divisions: vec!["div-a".into()],
            ..MeshConfig::default()
        };
        config.router.workers_per_division = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Router(_))));
    }
}
