use crate::config::{OVERPASS_TIMEOUT_SECS, USER_AGENT};
use crate::errors::ImportError;
use crate::http::RetryClient;
use crate::models::OverpassResponse;
use crate::overpass::query;
use std::time::Duration;

/// Thin wrapper tying the query builders to the retry client. Queries go out
/// as a text/plain POST body; responses decode into [`OverpassResponse`].
pub struct OverpassClient {
    http: RetryClient,
    client: reqwest::Client,
    url: String,
}

impl OverpassClient {
    pub fn new(url: &str) -> Result<Self, ImportError> {
        // The client-side timeout must outlast the server-side one declared
        // in the query header.
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(OVERPASS_TIMEOUT_SECS + 30))
            .build()?;

        Ok(Self {
            http: RetryClient::new(),
            client,
            url: url.to_string(),
        })
    }

    pub async fn root_relation_ids(&self, iso3: &str, level: u8) -> Result<Vec<i64>, ImportError> {
        let response = self.interpret(&query::country_root(iso3, level)).await?;
        Ok(response.elements.iter().map(|e| e.id).collect())
    }

    pub async fn child_relation_ids(
        &self,
        parent_relation_id: i64,
        level: u8,
    ) -> Result<Vec<i64>, ImportError> {
        let response = self
            .interpret(&query::children_of(parent_relation_id, level))
            .await?;
        Ok(response.elements.iter().map(|e| e.id).collect())
    }

    pub async fn relation_geometry(
        &self,
        relation_ids: &[i64],
    ) -> Result<OverpassResponse, ImportError> {
        self.interpret(&query::relation_geometry(relation_ids)).await
    }

    async fn interpret(&self, query_text: &str) -> Result<OverpassResponse, ImportError> {
        let request = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/plain")
            .body(query_text.to_string());

        let value = self.http.execute(request).await?;
        serde_json::from_value(value).map_err(|e| ImportError::Parse(e.to_string()))
    }
}
