use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::ClientConfig;
use crate::error::{PopError, Result};
use crate::getter::{Getter, RawTable};
use crate::request::Query;

/// Fetches tables from the Census Bureau data API.
#[derive(Clone)]
pub struct CensusApi {
    client: Client,
    config: ClientConfig,
}

impl CensusApi {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Query parameters as sent, including the API key when configured.
    pub fn params<'a>(&'a self, query: &'a Query) -> Vec<(&'a str, &'a str)> {
        let mut params: Vec<(&str, &str)> = query
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(key) = self.config.api_key.as_deref() {
            params.push(("key", key));
        }
        params
    }
}

impl Default for CensusApi {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl fmt::Debug for CensusApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CensusApi")
            .field("base_url", &self.config.base_url)
            .field("has_api_key", &self.config.api_key.is_some())
            .finish()
    }
}

#[async_trait]
impl Getter for CensusApi {
    async fn fetch(&self, query: &Query) -> Result<RawTable> {
        let url = self.config.endpoint_url(&query.path);
        tracing::debug!(%url, params = ?query.params, "fetching");

        let response = self
            .client
            .get(&url)
            .query(&self.params(query))
            .send()
            .await?;

        let status = response.status();
        // The API answers 204 when the geography filter matches nothing.
        if status == StatusCode::NO_CONTENT {
            return Ok(RawTable::default());
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PopError::UpstreamRequestFailed(format!(
                "{url} returned {status}: {}",
                body.trim()
            )));
        }

        let table = RawTable::from_json(&body)?;
        tracing::debug!(rows = table.rows.len(), "fetched");
        Ok(table)
    }
}
