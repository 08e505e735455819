//! REST client for the backend.

use async_trait::async_trait;
use gra_core::artifact::ArtifactSource;
use gra_core::plans::{PlanDetail, PlanSummary};
use gra_core::push::{parse_agent_stats, parse_push_value, AgentStats, AgentStatus};
use gra_core::store::GraHealth;
use gra_core::{CoreError, GraphKind, RawGraphSnapshot};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid endpoint for {base}")]
    InvalidUrl { base: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("could not decode {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                url: base.to_string(),
                source,
            })?;
        Ok(Self { http, base })
    }

    /// Appends percent-encoded path segments to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| ApiError::InvalidUrl {
                base: self.base.to_string(),
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get_value(&self, segments: &[&str]) -> Result<Value, ApiError> {
        let url = self.endpoint(segments)?;
        let label = url.to_string();
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: label.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { url: label, status });
        }
        response.json::<Value>().await.map_err(|err| ApiError::Decode {
            url: label,
            message: err.to_string(),
        })
    }

    async fn get_typed<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let value = self.get_value(segments).await?;
        decode(segments, value)
    }

    pub async fn plan_summaries(&self) -> Result<Vec<PlanSummary>, ApiError> {
        self.get_typed(&["v1", "global_plans_summary"]).await
    }

    pub async fn plan_detail(&self, plan_id: &str) -> Result<PlanDetail, ApiError> {
        self.get_typed(&["v1", "global_plans", plan_id]).await
    }

    pub async fn graph(&self, kind: GraphKind, graph_id: &str) -> Result<RawGraphSnapshot, ApiError> {
        let segments = match kind {
            GraphKind::Planning => vec!["plans", graph_id],
            GraphKind::Execution => vec!["v1", "execution_task_graphs", graph_id],
        };
        let value = self.get_value(&segments).await?;
        nodes_snapshot(&segments, value)
    }

    pub async fn agents_status(&self) -> Result<Vec<AgentStatus>, ApiError> {
        let segments = ["agents_status"];
        let value = self.get_value(&segments).await?;
        parse_push_value(value)
            .map(|update| update.agents)
            .map_err(|err| ApiError::Decode {
                url: segments.join("/"),
                message: err.to_string(),
            })
    }

    pub async fn agent_stats(&self) -> Result<Vec<AgentStats>, ApiError> {
        let value = self.get_value(&["v1", "stats", "agents"]).await?;
        Ok(parse_agent_stats(value))
    }

    /// Any successful response counts as online.
    pub async fn health(&self) -> GraHealth {
        match self.get_value(&["health"]).await {
            Ok(_) => GraHealth::Online,
            Err(err) => {
                debug!(event = "health_check_failed", error = %err);
                GraHealth::Offline
            }
        }
    }
}

#[async_trait]
impl ArtifactSource for BackendClient {
    async fn fetch_artifact(&self, reference: &str) -> Result<Value, CoreError> {
        let value = self
            .get_value(&["artifacts", reference])
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    CoreError::ArtifactNotFound {
                        reference: reference.to_string(),
                    }
                } else {
                    CoreError::SourceUnavailable(err.to_string())
                }
            })?;
        artifact_content(value).ok_or_else(|| {
            CoreError::Decode(format!("artifact {reference} has no content field"))
        })
    }
}

fn decode<T: DeserializeOwned>(segments: &[&str], value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|err| ApiError::Decode {
        url: segments.join("/"),
        message: err.to_string(),
    })
}

fn nodes_snapshot(segments: &[&str], value: Value) -> Result<RawGraphSnapshot, ApiError> {
    match value.get("nodes") {
        Some(nodes) if nodes.is_object() => Ok(RawGraphSnapshot::from_nodes_value(nodes)),
        _ => Err(ApiError::Decode {
            url: segments.join("/"),
            message: "missing nodes object".to_string(),
        }),
    }
}

fn artifact_content(mut value: Value) -> Option<Value> {
    value.as_object_mut()?.remove("content")
}
