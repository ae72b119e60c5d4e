//! Schema store client
//!
//! [`SchemaStoreClient`] is the narrow capability the provisioning pipeline
//! depends on. [`NotionClient`] implements it over HTTP.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, trace};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use std::time::Duration;

use super::error::StoreError;
use super::models::{CreateSchemaRequest, DatabaseObject, PatchSchemaRequest, SchemaResponse};
use crate::config::ApiSettings;

/// Create and patch schemas in the remote store
#[async_trait]
pub trait SchemaStoreClient: Send + Sync {
    /// `POST /databases`
    async fn create_schema(&self, request: &CreateSchemaRequest)
    -> Result<SchemaResponse, StoreError>;

    /// `PATCH /databases/{id}`
    async fn patch_schema(
        &self,
        schema_id: &str,
        request: &PatchSchemaRequest,
    ) -> Result<SchemaResponse, StoreError>;
}

/// HTTP client for a Notion-compatible workspace store
pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    notion_version: String,
}

impl std::fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .field("notion_version", &self.notion_version)
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(api_key: impl Into<String>, settings: &ApiSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("lifelog-provision/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            notion_version: settings.notion_version.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<SchemaResponse, StoreError> {
        let response = request
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.notion_version)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let object: DatabaseObject = response
                .json()
                .await
                .map_err(|e| StoreError::Network(format!("unreadable response body: {}", e)))?;
            trace!("store returned schema {} ({} properties)", object.id, object.properties.len());
            return Ok(object.into());
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_response(status.as_u16(), &body, retry_after))
    }
}

#[async_trait]
impl SchemaStoreClient for NotionClient {
    async fn create_schema(
        &self,
        request: &CreateSchemaRequest,
    ) -> Result<SchemaResponse, StoreError> {
        debug!("POST /databases ({})", request.title_text());
        self.send(self.http.post(self.url("databases")).json(request))
            .await
    }

    async fn patch_schema(
        &self,
        schema_id: &str,
        request: &PatchSchemaRequest,
    ) -> Result<SchemaResponse, StoreError> {
        let path = format!("databases/{}", urlencoding::encode(schema_id));
        debug!("PATCH /{}", path);
        self.send(self.http.patch(self.url(&path)).json(request))
            .await
    }
}

/// `Retry-After` in whole seconds
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
