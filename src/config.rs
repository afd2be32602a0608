use clap::Parser;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::gate::AuthGate;
use crate::identity::StaticCredentials;
use crate::rate_limit::RateRule;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "calc-gateway")]
#[command(about = "Calculator API with per-caller rate limits and API key gating")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    // JSON admission policy; built-in calculator policy when absent
    #[arg(long, env = "CALC_GATEWAY_POLICY")]
    pub policy: Option<PathBuf>,

    // Seconds between idle counter sweeps, 0 disables
    #[arg(long, default_value_t = 300)]
    pub sweep_interval: u64,

    // Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Route -> ordered rules. Routes not listed are unlimited.
#[derive(Debug, Clone, Default)]
pub struct RouteRateSpec {
    routes: HashMap<String, Vec<RateRule>>,
}

impl RouteRateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    // Rule names are budgets, so they must be unique across routes
    pub fn bind(mut self, route: impl Into<String>, rules: Vec<RateRule>) -> Result<Self, ConfigError> {
        let mut seen: HashSet<&str> = self.rule_names().collect();
        for rule in &rules {
            if !seen.insert(&rule.name) {
                return Err(ConfigError::DuplicateRule(rule.name.clone()));
            }
        }
        self.routes.insert(route.into(), rules);
        Ok(self)
    }

    pub fn rules_for(&self, route: &str) -> &[RateRule] {
        self.routes.get(route).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn routes(&self) -> impl Iterator<Item = (&str, &[RateRule])> {
        self.routes.iter().map(|(r, rules)| (r.as_str(), rules.as_slice()))
    }

    fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.routes.values().flatten().map(|r| r.name.as_str())
    }
}

// On-disk policy format
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(default)]
    pub gated_routes: Vec<String>,
    #[serde(default)]
    pub routes: HashMap<String, Vec<RuleSpec>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub limit: String,
}

impl RuleSpec {
    fn new(name: &str, limit: &str) -> Self {
        Self {
            name: name.to_string(),
            limit: limit.to_string(),
        }
    }
}

impl Default for PolicyFile {
    // The calculator service's own policy
    fn default() -> Self {
        let credentials = [
            ("A9d#4fG2kL@q", "Shahrukh"),
            ("R7!sB8xYp$Wm", "Salman"),
            ("Z6v%J3nQe^Tf", "Amir"),
        ]
        .into_iter()
        .map(|(k, o)| (k.to_string(), o.to_string()))
        .collect();

        let routes = HashMap::from([
            ("/add".to_string(), vec![RuleSpec::new("add_per_minute", "5 per minute")]),
            ("/sub".to_string(), vec![RuleSpec::new("sub_per_minute", "5 per minute")]),
            ("/mul".to_string(), vec![RuleSpec::new("mul_per_minute", "10 per minute")]),
            (
                "/div".to_string(),
                vec![
                    RuleSpec::new("div_per_minute", "5 per minute"),
                    RuleSpec::new("div_per_hour", "10 per hour"),
                ],
            ),
        ]);

        Self {
            credentials,
            gated_routes: vec!["/mul".to_string(), "/div".to_string()],
            routes,
        }
    }
}

/// Everything the admission pipeline needs, validated.
#[derive(Debug, Clone)]
pub struct Policy {
    pub credentials: StaticCredentials,
    pub gate: AuthGate,
    pub route_rules: RouteRateSpec,
}

impl Policy {
    pub fn calculator() -> Result<Self, ConfigError> {
        Self::try_from(PolicyFile::default())
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let file: PolicyFile = serde_json::from_str(text)?;
        Self::try_from(file)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Policy file when given, built-in calculator policy otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::calculator(),
        }
    }
}

impl TryFrom<PolicyFile> for Policy {
    type Error = ConfigError;

    fn try_from(file: PolicyFile) -> Result<Self, Self::Error> {
        let mut route_rules = RouteRateSpec::new();
        for (route, specs) in file.routes {
            let rules = specs
                .iter()
                .map(|spec| RateRule::parse(spec.name.clone(), &spec.limit))
                .collect::<Result<Vec<_>, _>>()?;
            route_rules = route_rules.bind(route, rules)?;
        }

        Ok(Self {
            credentials: StaticCredentials::new(file.credentials),
            gate: AuthGate::new(file.gated_routes),
            route_rules,
        })
    }
}
