//! Kernel spec enumeration against a user's notebook server

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::async_util::race_timeout;
use crate::hub::{append_url_path, ServerConnectSettings};
use crate::http::{HubRequest, SharedFetch};
use hublink_core::{HubError, HubResult};

/// Upper bound for one enumeration attempt
pub const KERNEL_SPECS_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of `GET api/kernelspecs`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelSpecs {
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub kernelspecs: HashMap<String, serde_json::Value>,
}

impl KernelSpecs {
    pub fn is_empty(&self) -> bool {
        self.kernelspecs.is_empty()
    }
}

/// Readiness probe for a notebook server.
///
/// `Ok(Some(_))` with at least one spec means the server is usable;
/// `Ok(None)` means it could not be enumerated (yet).
#[async_trait]
pub trait KernelSpecClient: Send + Sync {
    async fn get_kernel_specs(
        &self,
        settings: &ServerConnectSettings,
        cancel: &CancellationToken,
    ) -> HubResult<Option<KernelSpecs>>;
}

/// Lists kernel specs over the notebook server's REST API.
pub struct RestKernelSpecClient {
    fetch: SharedFetch,
    timeout: Duration,
}

impl RestKernelSpecClient {
    pub fn new(fetch: SharedFetch) -> Self {
        Self {
            fetch,
            timeout: KERNEL_SPECS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_specs(
        &self,
        settings: &ServerConnectSettings,
        cancel: &CancellationToken,
    ) -> HubResult<Option<KernelSpecs>> {
        let url = append_url_path(&settings.base_url, "api/kernelspecs")?;
        let mut request = HubRequest::get(url).headers(&settings.headers);
        if let Some(authorization) = settings.authorization() {
            request = request.header("Authorization", authorization);
        }

        let response = self.fetch.send(request, cancel).await?;
        if !response.is_success() {
            debug!(status = response.status, "[Validator] Kernel specs request rejected");
            return Ok(None);
        }
        let specs: KernelSpecs = response.json()?;
        if specs.is_empty() {
            return Ok(None);
        }
        Ok(Some(specs))
    }
}

#[async_trait]
impl KernelSpecClient for RestKernelSpecClient {
    async fn get_kernel_specs(
        &self,
        settings: &ServerConnectSettings,
        cancel: &CancellationToken,
    ) -> HubResult<Option<KernelSpecs>> {
        match race_timeout(self.timeout, self.fetch_specs(settings, cancel)).await {
            Some(Ok(specs)) => Ok(specs),
            Some(Err(HubError::Cancelled)) => Err(HubError::Cancelled),
            // Surfaced so the validator can offer to trust the certificate
            Some(Err(e)) if e.is_certificate_error() => Err(e),
            Some(Err(e)) => {
                error!(url = %settings.base_url, "[Validator] Kernel spec enumeration failed: {}", e);
                Ok(None)
            }
            None => {
                error!(url = %settings.base_url, "[Validator] Timed out enumerating kernel specs");
                Ok(None)
            }
        }
    }
}
