use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Components that gate order flow. Market data only affects signals.
const CRITICAL: [&str; 2] = ["database", "order_connector"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Components currently reporting down, critical or not.
    pub degraded: Vec<String>,
    pub last_change: Option<DateTime<Utc>>,
    pub components: ComponentHealth,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub database: bool,
    pub order_connector: bool,
    pub market_data: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, bool>,
}

impl ComponentHealth {
    pub fn get(&self, key: &str) -> Option<bool> {
        match key {
            "database" => Some(self.database),
            "order_connector" => Some(self.order_connector),
            "market_data" => Some(self.market_data),
            _ => self.extra.get(key).copied(),
        }
    }

    fn slot(&mut self, key: &str) -> &mut bool {
        match key {
            "database" => &mut self.database,
            "order_connector" => &mut self.order_connector,
            "market_data" => &mut self.market_data,
            _ => self.extra.entry(key.to_string()).or_insert(false),
        }
    }

    fn down(&self) -> Vec<String> {
        let mut down: Vec<String> = [
            ("database", self.database),
            ("order_connector", self.order_connector),
            ("market_data", self.market_data),
        ]
        .into_iter()
        .filter(|(_, up)| !up)
        .map(|(name, _)| name.to_string())
        .collect();

        let mut extra: Vec<String> = self
            .extra
            .iter()
            .filter(|(_, up)| !**up)
            .map(|(name, _)| name.clone())
            .collect();
        extra.sort();
        down.extend(extra);
        down
    }
}

struct HealthState {
    components: ComponentHealth,
    last_change: Option<DateTime<Utc>>,
}

/// Shared component health served on `GET /health`.
#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            state: Arc::new(RwLock::new(HealthState {
                components: ComponentHealth::default(),
                last_change: None,
            })),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let state = self.state.read().await;
        let degraded = state.components.down();
        let critical_down = degraded.iter().any(|c| CRITICAL.contains(&c.as_str()));

        HealthStatus {
            status: if critical_down { "degraded" } else { "healthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            degraded,
            last_change: state.last_change,
            components: state.components.clone(),
        }
    }

    /// Records a component reading; transitions are logged.
    pub async fn update_component(&self, component: &str, healthy: bool) {
        let mut state = self.state.write().await;
        let slot = state.components.slot(component);
        if *slot == healthy {
            return;
        }
        *slot = healthy;
        state.last_change = Some(Utc::now());

        if healthy {
            tracing::info!(component, "component recovered");
        } else {
            tracing::warn!(component, "component degraded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_degraded() {
        let checker = HealthChecker::new();
        let status = checker.get_status().await;

        assert_eq!(status.status, "degraded");
        assert_eq!(status.degraded, vec!["database", "order_connector", "market_data"]);
        assert!(status.last_change.is_none());
    }

    #[tokio::test]
    async fn test_market_data_outage_does_not_degrade() {
        let checker = HealthChecker::new();
        checker.update_component("database", true).await;
        checker.update_component("order_connector", true).await;

        let status = checker.get_status().await;
        assert_eq!(status.status, "healthy");
        assert_eq!(status.degraded, vec!["market_data"]);
        assert!(status.last_change.is_some());
    }

    #[tokio::test]
    async fn test_extra_components_tracked() {
        let checker = HealthChecker::new();
        checker.update_component("job_worker", true).await;
        checker.update_component("oanda", false).await;

        let status = checker.get_status().await;
        assert_eq!(status.components.get("job_worker"), Some(true));
        assert_eq!(status.components.get("oanda"), Some(false));
        assert_eq!(status.components.get("unknown"), None);
        assert!(status.degraded.contains(&"oanda".to_string()));
    }
}
