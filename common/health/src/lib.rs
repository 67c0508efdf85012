//! Liveness reporting for the long-running parts of the catcher.
//!
//! The webhook is only safe to route traffic to while its collaborators are
//! reachable: the Kafka producer loop keeps calling back, and the dedup store
//! answers pings. Each of those registers a component here and reports on its
//! own schedule. The registry folds them into a single probe result:
//!   - a component that reported unhealthy fails the probe
//!   - a component that missed its reporting deadline is `Stalled` and fails the probe
//!   - with `HealthStrategy::Any`, one healthy component is enough
//!
//! Handles write straight into the shared component map, so reporting never
//! needs a runtime and can be done from librdkafka's callback threads.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Default, Debug)]
pub struct HealthStatus {
    /// Combined result for the registry
    pub healthy: bool,
    /// Per-component status, rendered in the probe body for debugging
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = format!("{self:?}");
        if self.healthy {
            (StatusCode::OK, body).into_response()
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Registered, has not reported yet
    Starting,
    /// Healthy, must report again before the deadline
    HealthyUntil(OffsetDateTime),
    /// Explicitly reported as broken
    Unhealthy,
    /// Deadline passed without a new report
    Stalled,
}

impl ComponentStatus {
    fn is_healthy_at(&self, now: OffsetDateTime) -> bool {
        matches!(self, ComponentStatus::HealthyUntil(until) if *until > now)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HealthStrategy {
    /// Every component must be healthy
    All,
    /// At least one component must be healthy
    Any,
}

impl std::str::FromStr for HealthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "all" => Ok(HealthStrategy::All),
            "any" => Ok(HealthStrategy::Any),
            _ => Err(format!("Unknown Health Strategy: {s}, must be ALL or ANY")),
        }
    }
}

type Components = Arc<RwLock<HashMap<String, ComponentStatus>>>;

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Components,
}

impl HealthHandle {
    /// Marks the component healthy until now + deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc() + self.deadline,
        ));
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut map) => {
                map.insert(self.component.clone(), status);
            }
            // The probe keeps failing and the pod gets restarted
            Err(_) => warn!(
                component = self.component,
                "poisoned health registry lock, dropping report"
            ),
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    strategy: HealthStrategy,
    components: Components,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self::new_with_strategy(name, HealthStrategy::All)
    }

    pub fn new_with_strategy(name: &str, strategy: HealthStrategy) -> Self {
        Self {
            name: name.to_owned(),
            strategy,
            components: Default::default(),
        }
    }

    /// Registers a component in `Starting` state and returns the handle it reports through.
    pub fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Computes the probe result. Usable directly as an axum handler output.
    pub fn get_status(&self) -> HealthStatus {
        let now = OffsetDateTime::now_utc();
        let components: HashMap<String, ComponentStatus> = match self.components.read() {
            Ok(map) => map
                .iter()
                .map(|(name, status)| {
                    let status = match status {
                        ComponentStatus::HealthyUntil(_) if !status.is_healthy_at(now) => {
                            ComponentStatus::Stalled
                        }
                        other => other.clone(),
                    };
                    (name.clone(), status)
                })
                .collect(),
            Err(_) => {
                warn!("{} health registry lock poisoned", self.name);
                return HealthStatus::default();
            }
        };

        let mut healthy = components.values().map(|s| s.is_healthy_at(now));
        let healthy = !components.is_empty()
            && match self.strategy {
                HealthStrategy::All => healthy.all(|h| h),
                HealthStrategy::Any => healthy.any(|h| h),
            };

        if healthy {
            info!("{} health check ok", self.name);
        } else {
            warn!("{} health check failed: {:?}", self.name, components);
        }
        HealthStatus {
            healthy,
            components,
        }
    }
}
