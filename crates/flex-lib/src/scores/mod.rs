//! Scoring functions and score records
//!
//! Four independent scores are computed per account and per day, each in
//! `[0, 10]`. The composite Flexibility Score is a fixed linear combination
//! of the four, applied at aggregation time.

pub mod diversification;
pub mod launch_template;
pub mod policy;
pub mod scaling;

use crate::error::{FlexError, Result};
use crate::models::Account;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Names of the published metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricName {
    InstanceDiversificationScore,
    LaunchTemplateScore,
    PolicyScore,
    ScalingScore,
    FlexibilityScore,
    #[serde(rename = "vcpuh")]
    UtilizationHours,
}

impl MetricName {
    /// The four component scores
    pub const COMPONENTS: [MetricName; 4] = [
        MetricName::InstanceDiversificationScore,
        MetricName::LaunchTemplateScore,
        MetricName::PolicyScore,
        MetricName::ScalingScore,
    ];

    /// Metrics published per account each day
    pub const DAILY: [MetricName; 5] = [
        MetricName::InstanceDiversificationScore,
        MetricName::LaunchTemplateScore,
        MetricName::PolicyScore,
        MetricName::ScalingScore,
        MetricName::UtilizationHours,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::InstanceDiversificationScore => "InstanceDiversificationScore",
            MetricName::LaunchTemplateScore => "LaunchTemplateScore",
            MetricName::PolicyScore => "PolicyScore",
            MetricName::ScalingScore => "ScalingScore",
            MetricName::FlexibilityScore => "FlexibilityScore",
            MetricName::UtilizationHours => "vcpuh",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "InstanceDiversificationScore" => Some(MetricName::InstanceDiversificationScore),
            "LaunchTemplateScore" => Some(MetricName::LaunchTemplateScore),
            "PolicyScore" => Some(MetricName::PolicyScore),
            "ScalingScore" => Some(MetricName::ScalingScore),
            "FlexibilityScore" => Some(MetricName::FlexibilityScore),
            "vcpuh" => Some(MetricName::UtilizationHours),
            _ => None,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed weights of the component scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub diversification: f64,
    pub launch_template: f64,
    pub policy: f64,
    pub scaling: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            diversification: 0.25,
            launch_template: 0.25,
            policy: 0.15,
            scaling: 0.35,
        }
    }
}

const WEIGHT_TOLERANCE: f64 = 1e-9;

impl ScoreWeights {
    /// Build weights, rejecting any set that does not sum to 1.0
    pub fn new(diversification: f64, launch_template: f64, policy: f64, scaling: f64) -> Result<Self> {
        Self {
            diversification,
            launch_template,
            policy,
            scaling,
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self> {
        let sum = self.diversification + self.launch_template + self.policy + self.scaling;
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(FlexError::InvalidWeights { sum });
        }
        Ok(self)
    }

    /// Weight of a component score, `None` for non-component metrics
    pub fn weight(&self, name: MetricName) -> Option<f64> {
        match name {
            MetricName::InstanceDiversificationScore => Some(self.diversification),
            MetricName::LaunchTemplateScore => Some(self.launch_template),
            MetricName::PolicyScore => Some(self.policy),
            MetricName::ScalingScore => Some(self.scaling),
            MetricName::FlexibilityScore | MetricName::UtilizationHours => None,
        }
    }
}

/// Metric values keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreRecord(BTreeMap<MetricName, f64>);

impl ScoreRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: MetricName) -> Option<f64> {
        self.0.get(&name).copied()
    }

    pub fn set(&mut self, name: MetricName, value: f64) {
        self.0.insert(name, value);
    }

    pub fn with(mut self, name: MetricName, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn utilization_hours(&self) -> Option<f64> {
        self.get(MetricName::UtilizationHours)
    }

    pub fn flexibility_score(&self) -> Option<f64> {
        self.get(MetricName::FlexibilityScore)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricName, f64)> + '_ {
        self.0.iter().map(|(name, value)| (*name, *value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Raw daily metrics of one account
pub fn daily_scores(account: &Account) -> ScoreRecord {
    ScoreRecord::new()
        .with(MetricName::UtilizationHours, account.utilization_hours() as f64)
        .with(
            MetricName::LaunchTemplateScore,
            launch_template::score(&account.instances),
        )
        .with(
            MetricName::PolicyScore,
            policy::score(&account.instances, &account.scaling_groups),
        )
        .with(
            MetricName::InstanceDiversificationScore,
            diversification::score(&account.scaling_groups, &account.launch_templates),
        )
        .with(MetricName::ScalingScore, scaling::score(&account.instances))
}
