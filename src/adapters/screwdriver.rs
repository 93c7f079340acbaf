//! Screwdriver v4 REST API client.
//!
//! Endpoints used:
//! - GET  /v4/builds/{id}, /v4/jobs/{id}, /v4/pipelines/{id}
//! - GET  /v4/builds/{id}/secrets
//! - PUT  /v4/builds/{id}               {"status": ...}
//! - PUT  /v4/builds/{id}/steps/{name}  {"startTime": ...} | {"endTime": ..., "code": ...}
//!
//! Auth: Bearer token (the launcher's JWT)

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use reqwest::Url;
use serde::Serialize;
use tracing::debug;

use crate::domain::{Build, BuildStatus, Job, Pipeline, Secret};

use super::ControlPlane;

/// HTTP client for the control plane
pub struct ScrewdriverApi {
    base_url: Url,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: BuildStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepStart {
    start_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepStop {
    end_time: String,
    code: i32,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ScrewdriverApi {
    /// Create a client for `base_url` (e.g. `https://api.screwdriver.cd`)
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            anyhow::bail!("API URI cannot be empty");
        }
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid API URI: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API URI cannot be a base: {}", base_url);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("sd-launcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            token: token.into(),
            client,
        })
    }

    /// Build API URL; each segment is percent-encoded on its own
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("API URI cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .push("v4")
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.api_url(segments)?;
        debug!(%url, "GET");

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {} returned {}: {}", url, status, body.trim());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    async fn put_json<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> Result<()> {
        let url = self.api_url(segments)?;
        debug!(%url, "PUT");

        let response = self
            .client
            .put(url.clone())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("PUT {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("PUT {} returned {}: {}", url, status, body.trim());
        }

        Ok(())
    }
}

#[async_trait]
impl ControlPlane for ScrewdriverApi {
    async fn build(&self, build_id: u64) -> Result<Build> {
        self.get_json(&["builds", &build_id.to_string()]).await
    }

    async fn job(&self, job_id: u64) -> Result<Job> {
        self.get_json(&["jobs", &job_id.to_string()]).await
    }

    async fn pipeline(&self, pipeline_id: u64) -> Result<Pipeline> {
        self.get_json(&["pipelines", &pipeline_id.to_string()]).await
    }

    async fn secrets_for_build(&self, build: &Build) -> Result<Vec<Secret>> {
        self.get_json(&["builds", &build.id.to_string(), "secrets"])
            .await
    }

    async fn update_step_start(&self, build_id: u64, step: &str) -> Result<()> {
        let build_id = build_id.to_string();
        self.put_json(
            &["builds", &build_id, "steps", step],
            &StepStart { start_time: now() },
        )
        .await
    }

    async fn update_step_stop(&self, build_id: u64, step: &str, code: i32) -> Result<()> {
        let build_id = build_id.to_string();
        self.put_json(
            &["builds", &build_id, "steps", step],
            &StepStop {
                end_time: now(),
                code,
            },
        )
        .await
    }

    async fn update_build_status(&self, build_id: u64, status: BuildStatus) -> Result<()> {
        self.put_json(&["builds", &build_id.to_string()], &StatusUpdate { status })
            .await
    }
}
