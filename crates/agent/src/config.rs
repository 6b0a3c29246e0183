//! Agent configuration

use anyhow::{Context, Result};
use flex_lib::orchestrator::{
    EvaluationConfig, FailurePolicy, DEFAULT_BUCKET, DEFAULT_LOOKBACK_DAYS,
    DEFAULT_MEMBER_ROLE_NAME, DEFAULT_NAMESPACE,
};
use flex_lib::{AccountInfo, ScoreWeights};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "FLEX_CONFIG_FILE";

/// An organization member listed in the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Component weights as written in the configuration
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_diversification_weight")]
    pub diversification: f64,
    #[serde(default = "default_launch_template_weight")]
    pub launch_template: f64,
    #[serde(default = "default_policy_weight")]
    pub policy: f64,
    #[serde(default = "default_scaling_weight")]
    pub scaling: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            diversification: default_diversification_weight(),
            launch_template: default_launch_template_weight(),
            policy: default_policy_weight(),
            scaling: default_scaling_weight(),
        }
    }
}

fn default_diversification_weight() -> f64 {
    ScoreWeights::default().diversification
}

fn default_launch_template_weight() -> f64 {
    ScoreWeights::default().launch_template
}

fn default_policy_weight() -> f64 {
    ScoreWeights::default().policy
}

fn default_scaling_weight() -> f64 {
    ScoreWeights::default().scaling
}

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Root of the local audit, metric and object directories
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Role assumed in member accounts
    #[serde(default = "default_member_role_name")]
    pub member_role_name: String,

    /// Audit lookback horizon in days
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// The evaluated day is this many days before each run
    #[serde(default = "default_days_before")]
    pub days_before: u32,

    /// Seconds between evaluation runs
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,

    /// Run an evaluation immediately after startup
    #[serde(default = "default_true")]
    pub run_on_start: bool,

    /// Run a single evaluation and exit
    #[serde(default)]
    pub run_once: bool,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// When false the directory behaves as if organizations were not in use
    #[serde(default = "default_true")]
    pub organizations_enabled: bool,

    /// Account the agent runs as; the master account when unset
    #[serde(default)]
    pub caller_account_id: Option<String>,

    #[serde(default)]
    pub master_account_id: Option<String>,

    #[serde(default)]
    pub accounts: Vec<AccountEntry>,

    #[serde(default)]
    pub weights: WeightsConfig,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "flexscore-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_member_role_name() -> String {
    DEFAULT_MEMBER_ROLE_NAME.to_string()
}

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_days_before() -> u32 {
    1
}

fn default_evaluation_interval() -> u64 {
    86_400
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    /// Load configuration from an optional file and the environment.
    ///
    /// Environment variables use the `FLEX` prefix and `__` as the nesting
    /// separator, e.g. `FLEX_WEIGHTS__SCALING=0.4`.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("FLEX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validated score weights
    pub fn score_weights(&self) -> Result<ScoreWeights> {
        let w = self.weights;
        ScoreWeights::new(w.diversification, w.launch_template, w.policy, w.scaling)
            .context("Invalid score weights")
    }

    pub fn evaluation_config(&self) -> Result<EvaluationConfig> {
        Ok(EvaluationConfig {
            namespace: self.namespace.clone(),
            bucket: self.bucket.clone(),
            member_role_name: self.member_role_name.clone(),
            lookback_days: self.lookback_days,
            days_before: self.days_before,
            failure_policy: self.failure_policy,
            weights: self.score_weights()?,
        })
    }

    /// Account the agent runs as
    pub fn caller_account(&self) -> Option<String> {
        self.caller_account_id
            .clone()
            .or_else(|| self.master_account_id.clone())
            .or_else(|| self.accounts.first().map(|a| a.id.clone()))
    }

    /// Directory entries; the master account is flagged
    pub fn account_infos(&self) -> Vec<AccountInfo> {
        let master = self.master_account_id.clone().or_else(|| self.caller_account());
        self.accounts
            .iter()
            .map(|a| AccountInfo {
                id: a.id.clone(),
                name: a.name.clone(),
                is_master: master.as_deref() == Some(a.id.as_str()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AgentConfig {
        config::Config::builder()
            .add_source(config::File::from_str(json, config::FileFormat::Json))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse("{}");

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.namespace, "FlexibilityScore");
        assert_eq!(config.lookback_days, 90);
        assert_eq!(config.days_before, 1);
        assert!(config.run_on_start);
        assert!(!config.run_once);
        assert_eq!(config.failure_policy, FailurePolicy::FailRun);
        assert_eq!(config.score_weights().unwrap(), ScoreWeights::default());
    }

    #[test]
    fn test_accounts_and_master_flag() {
        let config = parse(
            r#"{
                "master_account_id": "111111111111",
                "accounts": [{"id": "111111111111", "name": "management"}, {"id": "222222222222"}],
                "failure_policy": "skip_failed_accounts"
            }"#,
        );

        let infos = config.account_infos();
        assert_eq!(infos.len(), 2);
        assert!(infos[0].is_master);
        assert!(!infos[1].is_master);
        assert_eq!(config.caller_account().as_deref(), Some("111111111111"));
        assert_eq!(
            config.evaluation_config().unwrap().failure_policy,
            FailurePolicy::SkipFailedAccounts
        );
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let config = parse(r#"{"weights": {"scaling": 0.9}}"#);
        assert!(config.score_weights().is_err());
    }
}
