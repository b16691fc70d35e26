//! Alertmanager forwarding
//!
//! Applies the filter policy to an observed event and, when it passes,
//! posts a single alert to the gateway's v1 alerts endpoint. Delivery is
//! idempotent per event key: Alertmanager deduplicates on the label set,
//! so re-delivery after a transient failure is safe.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use k8s_openapi::api::core::v1::Event;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FilterConfig;
use crate::error::{Error, Result};

/// Alertmanager v1 alerts endpoint path.
const ALERTS_PATH: &str = "/api/v1/alerts";

/// Fixed label identifying this process as the alert originator.
const CLIENT_TAG: &str = "event-alerter";

/// One Alertmanager alert, as posted to `/api/v1/alerts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    #[serde(rename = "generatorURL")]
    pub generator_url: String,
}

/// Immutable inclusion policy over event kind, type, and reason.
///
/// Each dimension with no configured values matches everything; a
/// configured dimension requires exact (case-insensitive) membership. An
/// event is forwarded when ANY dimension matches — inclusive OR, not AND.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    kinds: HashSet<String>,
    types: HashSet<String>,
    reasons: HashSet<String>,
}

impl FilterPolicy {
    #[must_use]
    pub fn new(config: &FilterConfig) -> Self {
        let lower = |values: &[String]| {
            values
                .iter()
                .map(|value| value.to_lowercase())
                .collect::<HashSet<_>>()
        };
        Self {
            kinds: lower(&config.kinds),
            types: lower(&config.types),
            reasons: lower(&config.reasons),
        }
    }

    /// Test an event's lowercase classification against the policy.
    #[must_use]
    pub fn matches(&self, kind: &str, event_type: &str, reason: &str) -> bool {
        // An unconfigured dimension matches every event.
        let kind_ok = self.kinds.is_empty() || self.kinds.contains(kind);
        let type_ok = self.types.is_empty() || self.types.contains(event_type);
        let reason_ok = self.reasons.is_empty() || self.reasons.contains(reason);
        kind_ok || type_ok || reason_ok
    }
}

/// Handler forwarding filtered events to an Alertmanager gateway.
#[derive(Debug, Clone)]
pub struct AlertManager {
    endpoint: String,
    policy: FilterPolicy,
    http: reqwest::Client,
}

impl AlertManager {
    /// Build the handler for a gateway base URL.
    ///
    /// The request timeout bounds every delivery attempt so a hung gateway
    /// cannot stall a worker indefinitely.
    pub fn new(
        alertmanager_url: &str,
        config: &FilterConfig,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            endpoint: format!("{}{ALERTS_PATH}", alertmanager_url.trim_end_matches('/')),
            policy: FilterPolicy::new(config),
            http,
        })
    }

    /// Apply the filter policy and forward the event if it passes.
    ///
    /// A filtered-out event completes successfully; delivery failures
    /// propagate to the worker for retry classification.
    pub async fn handle(&self, event: &Event) -> Result<()> {
        let kind = event.involved_object.kind.as_deref().unwrap_or_default();
        let event_type = event.type_.as_deref().unwrap_or_default();
        let reason = event.reason.as_deref().unwrap_or_default();

        if !self.policy.matches(
            &kind.to_lowercase(),
            &event_type.to_lowercase(),
            &reason.to_lowercase(),
        ) {
            debug!(
                kind = %kind,
                event_type = %event_type,
                reason = %reason,
                "event filtered out, no alert"
            );
            return Ok(());
        }

        let alert = build_alert(event);
        let alertname = alert.labels.get("alertname").cloned().unwrap_or_default();
        self.fire(&[alert]).await?;
        info!(alertname = %alertname, "alert delivered");
        Ok(())
    }

    /// Post a batch of alerts to the gateway. Only HTTP 200 is success.
    async fn fire(&self, alerts: &[Alert]) -> Result<()> {
        let response = self.http.post(&self.endpoint).json(alerts).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "alert gateway rejected delivery");
            return Err(Error::GatewayStatus { status });
        }
        Ok(())
    }
}

/// Map an observed event onto the alert label set.
fn build_alert(event: &Event) -> Alert {
    let involved = &event.involved_object;
    let kind = involved.kind.as_deref().unwrap_or_default();
    let reason = event.reason.as_deref().unwrap_or_default();
    let source = event.source.as_ref();

    let owned = |value: Option<&String>| value.cloned().unwrap_or_default();

    let labels = BTreeMap::from([
        ("alertname".to_string(), format!("{kind} {reason}")),
        ("namespace".to_string(), owned(event.metadata.namespace.as_ref())),
        ("name".to_string(), owned(event.metadata.name.as_ref())),
        (
            "component".to_string(),
            owned(source.and_then(|s| s.component.as_ref())),
        ),
        ("host".to_string(), owned(source.and_then(|s| s.host.as_ref()))),
        ("reason".to_string(), reason.to_string()),
        ("kind".to_string(), kind.to_string()),
        ("message".to_string(), owned(event.message.as_ref())),
        ("client".to_string(), CLIENT_TAG.to_string()),
        ("level".to_string(), owned(event.type_.as_ref())),
        (
            "involvedObjectNamespace".to_string(),
            owned(involved.namespace.as_ref()),
        ),
        ("involvedObjectName".to_string(), owned(involved.name.as_ref())),
        ("fieldPath".to_string(), owned(involved.field_path.as_ref())),
    ]);

    Alert {
        labels,
        annotations: BTreeMap::new(),
        generator_url: String::new(),
    }
}
