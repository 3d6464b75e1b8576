use std::time::Duration;

use anyhow::{Context, anyhow};
use serde_json::json;

use super::{ExecutionRequest, ExecutionResult, ProviderPool, RawProviderResponse, normalize};
use crate::config::{FallbackConfig, ProviderConfig, ProviderFamily};

/// Transport seam between the dispatcher and the outside world.
///
/// The production implementation drives HTTP; tests script provider
/// behavior without a network.
#[allow(async_fn_in_trait)]
pub trait ExecutionBackend {
    async fn run_provider(
        &self,
        provider: &ProviderConfig,
        request: &ExecutionRequest,
    ) -> anyhow::Result<RawProviderResponse>;

    async fn run_fallback(
        &self,
        fallback: &FallbackConfig,
        request: &ExecutionRequest,
    ) -> anyhow::Result<RawProviderResponse>;
}

/// Failover dispatcher over the provider pool.
///
/// `execute` is infallible by contract: a student's attempt must never crash
/// because a third-party sandbox is down. Every path degrades to a concrete
/// `ExecutionResult`, worst case a synthetic `ServiceError`.
pub struct Dispatcher<B> {
    pool: ProviderPool,
    fallback: Option<FallbackConfig>,
    backend: B,
}

pub type HttpDispatcher = Dispatcher<HttpBackend>;

impl<B: ExecutionBackend> Dispatcher<B> {
    pub fn new(pool: ProviderPool, fallback: Option<FallbackConfig>, backend: B) -> Self {
        Self {
            pool,
            fallback,
            backend,
        }
    }

    pub fn pool(&self) -> &ProviderPool {
        &self.pool
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one execution request, retrying across the pool.
    ///
    /// Every provider failure is treated as transient and advances the
    /// cursor; a structurally valid response returns immediately without
    /// advancing. After the pool is exhausted the secondary fallback gets
    /// one attempt before the synthetic service-error result.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        for attempt in 0..self.pool.len() {
            let provider = self.pool.current();

            match self.backend.run_provider(&provider, request).await {
                Ok(raw) if raw.is_structurally_valid() => {
                    log::debug!(
                        "Provider {} answered on attempt {}",
                        provider.name,
                        attempt + 1
                    );
                    return normalize(&raw);
                }
                Ok(_) => {
                    log::warn!(
                        "Provider {} returned a structurally empty response, advancing",
                        provider.name
                    );
                }
                Err(e) => {
                    log::warn!("Provider {} failed: {e}, advancing", provider.name);
                }
            }

            self.pool.advance();
        }

        if let Some(fallback) = &self.fallback {
            log::warn!(
                "All {} providers exhausted, trying fallback {}",
                self.pool.len(),
                fallback.name
            );
            match self.backend.run_fallback(fallback, request).await {
                Ok(raw) if raw.is_structurally_valid() => return normalize(&raw),
                Ok(_) => log::error!("Fallback {} returned an empty response", fallback.name),
                Err(e) => log::error!("Fallback {} failed: {e}", fallback.name),
            }
        }

        log::error!("Every execution provider failed, returning service error");
        ExecutionResult::service_unavailable("all execution providers failed")
    }
}

/// Production backend: outbound HTTP via a shared client with an explicit
/// per-call timeout.
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(call_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn run_judge(
        &self,
        provider: &ProviderConfig,
        request: &ExecutionRequest,
    ) -> anyhow::Result<RawProviderResponse> {
        let url = format!(
            "{}/submissions?base64_encoded=false&wait=true",
            provider.base_url.trim_end_matches('/')
        );

        let mut builder = self.client.post(&url).json(&json!({
            "source_code": request.source_code,
            "language_id": request.language.judge_id(),
            "stdin": request.stdin,
            "expected_output": request.expected_output,
        }));
        if let Some(key) = &provider.api_key {
            builder = builder.header("X-Auth-Token", key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("provider returned HTTP {status}"));
        }

        let judge = response.json().await?;
        Ok(RawProviderResponse::Judge(judge))
    }

    async fn run_script(
        &self,
        base_url: &str,
        request: &ExecutionRequest,
    ) -> anyhow::Result<RawProviderResponse> {
        let url = format!("{}/execute", base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "language": request.language.script_name(),
                "version": "*",
                "files": [{ "content": request.source_code }],
                "stdin": request.stdin,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("provider returned HTTP {status}"));
        }

        let script = response.json().await?;
        Ok(RawProviderResponse::Script(script))
    }
}

impl ExecutionBackend for HttpBackend {
    async fn run_provider(
        &self,
        provider: &ProviderConfig,
        request: &ExecutionRequest,
    ) -> anyhow::Result<RawProviderResponse> {
        match provider.family {
            ProviderFamily::Judge => self.run_judge(provider, request).await,
            ProviderFamily::Script => self.run_script(&provider.base_url, request).await,
        }
    }

    async fn run_fallback(
        &self,
        fallback: &FallbackConfig,
        request: &ExecutionRequest,
    ) -> anyhow::Result<RawProviderResponse> {
        self.run_script(&fallback.base_url, request).await
    }
}
