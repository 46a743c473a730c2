//! Service health probing for the api_status route.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::core::config::StatusConfig;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub url: String,
    /// "operational" or "down".
    pub status: String,
    pub latency_ms: u64,
}

#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn check(&self) -> Vec<ServiceStatus>;
}

pub struct HttpStatusProbe {
    client: reqwest::Client,
    config: StatusConfig,
}

impl HttpStatusProbe {
    pub fn new(config: StatusConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn check(&self) -> Vec<ServiceStatus> {
        let mut statuses = Vec::with_capacity(self.config.endpoints.len());

        for endpoint in &self.config.endpoints {
            let start = Instant::now();
            let ok = match self
                .client
                .get(&endpoint.url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
            {
                Ok(response) => response.status().is_success(),
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint.name, "Health probe failed: {e}");
                    false
                }
            };

            statuses.push(ServiceStatus {
                name: endpoint.name.clone(),
                url: endpoint.url.clone(),
                status: if ok { "operational" } else { "down" }.to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            });
        }

        statuses
    }
}

pub fn status_summary(statuses: &[ServiceStatus]) -> String {
    if statuses.is_empty() {
        return "No services are configured for monitoring.".to_string();
    }
    let operational = statuses.iter().filter(|s| s.status == "operational").count();
    format!(
        "{operational} of {} monitored services are operational.",
        statuses.len()
    )
}
