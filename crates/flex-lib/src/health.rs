//! Health of the evaluation pipeline
//!
//! Every run reports on its three stages. Liveness is the worst stage status;
//! readiness only says whether the configuration was loaded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stages of an evaluation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Account discovery and audit-event folding
    Fetcher,
    /// Daily scoring and aggregation
    Scorer,
    /// Metric sink and snapshot archival
    Publisher,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Fetcher, Stage::Scorer, Stage::Publisher];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetcher => "fetcher",
            Stage::Scorer => "scorer",
            Stage::Publisher => "publisher",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one stage, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Last run finished with some accounts skipped or no archived snapshot
    Degraded,
    /// Last run failed in this stage
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Stage, ComponentHealth>,
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct RegistryState {
    stages: BTreeMap<Stage, ComponentHealth>,
    configured: bool,
}

/// Shared, cloneable view of the pipeline's health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every stage starts healthy; the registry starts not ready
    pub fn new() -> Self {
        let stages = Stage::ALL
            .iter()
            .map(|stage| (*stage, ComponentHealth::new(ComponentStatus::Healthy, None)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(RegistryState {
                stages,
                configured: false,
            })),
        }
    }

    pub async fn report(&self, stage: Stage, status: ComponentStatus, message: Option<String>) {
        self.state
            .write()
            .await
            .stages
            .insert(stage, ComponentHealth::new(status, message));
    }

    pub async fn set_healthy(&self, stage: Stage) {
        self.report(stage, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, stage: Stage, message: impl Into<String>) {
        self.report(stage, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, stage: Stage, message: impl Into<String>) {
        self.report(stage, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Mark the configuration as loaded (or not)
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.configured = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.state.read().await.stages.clone();
        let status = components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    /// A failed run shows up in [`health`](Self::health) but does not take
    /// the agent out of service.
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = self.state.read().await.configured;
        ReadinessResponse {
            ready,
            reason: (!ready).then(|| "Configuration not loaded".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_stages_start_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.keys().copied().collect::<Vec<_>>(), Stage::ALL);
    }

    #[tokio::test]
    async fn test_skipped_accounts_degrade_fetcher() {
        let registry = HealthRegistry::new();
        registry
            .set_degraded(Stage::Fetcher, "1 account skipped")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[&Stage::Fetcher].message.as_deref(),
            Some("1 account skipped")
        );
    }

    #[tokio::test]
    async fn test_worst_stage_wins() {
        let registry = HealthRegistry::new();
        registry.set_degraded(Stage::Scorer, "slow").await;
        registry
            .set_unhealthy(Stage::Publisher, "sink unavailable")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(!health.components[&Stage::Publisher].status.is_operational());

        registry.set_healthy(Stage::Publisher).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_readiness_follows_configuration_only() {
        let registry = HealthRegistry::new();

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Configuration not loaded"));

        registry.set_ready(true).await;
        registry.set_unhealthy(Stage::Fetcher, "run failed").await;
        assert!(registry.readiness().await.ready);
    }

    #[test]
    fn test_stages_serialize_lowercase() {
        let health = HealthResponse {
            status: ComponentStatus::Degraded,
            components: BTreeMap::from([(
                Stage::Publisher,
                ComponentHealth::new(ComponentStatus::Degraded, Some("no snapshot".to_string())),
            )]),
        };
        let json = serde_json::to_value(&health).unwrap();

        assert_eq!(json["status"], "degraded");
        assert_eq!(json["components"]["publisher"]["message"], "no snapshot");
    }
}
