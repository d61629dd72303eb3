//! Cloud Code quota API (`fetchAvailableModels`).
//!
//! The header set below is what the upstream checks to decide which client
//! types may call this endpoint. Change it and the API starts answering 403.

use std::collections::BTreeMap;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::core::http::{QUOTA_TIMEOUT, build_client, error_body};
use crate::core::oauth::AccessToken;
use crate::error::{AgqError, Result};

/// Quota/model availability endpoint.
pub const QUOTA_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal:fetchAvailableModels";

/// `User-Agent` expected by the quota API.
pub const QUOTA_USER_AGENT: &str = "antigravity/1.11.5 windows/amd64";
/// `X-Goog-Api-Client` expected by the quota API.
pub const GOOG_API_CLIENT: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";
/// `Client-Metadata` expected by the quota API.
pub const CLIENT_METADATA: &str =
    r#"{"ideType":"IDE_UNSPECIFIED","platform":"PLATFORM_UNSPECIFIED","pluginType":"GEMINI"}"#;

/// One entry of the `models` object.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub quota_info: Option<QuotaInfo>,
}

/// Quota sub-record of a model.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaInfo {
    /// Fraction of quota left, 0.0 to 1.0.
    #[serde(default)]
    pub remaining_fraction: Option<f64>,
    /// ISO-8601 timestamp, `Z` or offset.
    #[serde(default)]
    pub reset_time: Option<String>,
}

/// Model id → model info, in stable order.
pub type ModelMap = BTreeMap<String, ModelInfo>;

#[derive(Debug, Deserialize)]
struct FetchModelsResponse {
    #[serde(default)]
    models: BTreeMap<String, Value>,
}

/// Decode a `fetchAvailableModels` body.
///
/// Entries that do not have the expected shape are dropped individually.
///
/// # Errors
/// Returns [`AgqError::ParseResponse`] if the body is not a JSON object.
pub fn parse_models(body: &str) -> Result<ModelMap> {
    let response: FetchModelsResponse =
        serde_json::from_str(body).map_err(|e| AgqError::ParseResponse(e.to_string()))?;

    let mut models = ModelMap::new();
    for (model_id, raw) in response.models {
        match serde_json::from_value::<ModelInfo>(raw) {
            Ok(info) => {
                models.insert(model_id, info);
            }
            Err(e) => {
                tracing::warn!(model = %model_id, error = %e, "Skipping malformed model entry");
            }
        }
    }
    Ok(models)
}

/// Calls the quota API for one account.
#[derive(Debug, Clone)]
pub struct QuotaFetcher {
    http: Client,
    url: String,
}

impl QuotaFetcher {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: build_client(QUOTA_TIMEOUT)?,
            url: url.into(),
        })
    }

    /// Fetch models, reporting why a fetch failed.
    ///
    /// # Errors
    /// Returns a network, timeout, status or parse error.
    pub async fn try_fetch(&self, access: &AccessToken) -> Result<ModelMap> {
        let response = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", access.as_str()))
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, QUOTA_USER_AGENT)
            .header("X-Goog-Api-Client", GOOG_API_CLIENT)
            .header("Client-Metadata", CLIENT_METADATA)
            .body("{}")
            .send()
            .await
            .map_err(|e| AgqError::from_reqwest(&e, QUOTA_TIMEOUT.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgqError::ProviderApi {
                status_code: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AgqError::from_reqwest(&e, QUOTA_TIMEOUT.as_secs()))?;
        parse_models(&body)
    }

    /// Fetch models; any failure yields an empty map ("no data this cycle").
    pub async fn fetch(&self, access: &AccessToken, email: &str) -> ModelMap {
        match self.try_fetch(access).await {
            Ok(models) => {
                tracing::debug!(account = %email, models = models.len(), "Fetched models");
                models
            }
            Err(AgqError::ProviderApi {
                status_code,
                message,
            }) => {
                tracing::error!(account = %email, status = status_code, body = %message, "Failed to fetch models");
                ModelMap::new()
            }
            Err(e) => {
                tracing::error!(account = %email, error = %e, code = e.error_code(), "Network error fetching models");
                ModelMap::new()
            }
        }
    }
}
