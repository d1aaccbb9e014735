use crate::config::{USER_AGENT, WIKIDATA_BATCH, WIKIDATA_BATCH_DELAY};
use crate::errors::ImportError;
use crate::http::RetryClient;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Batch lookup of Wikimedia Commons categories (property P373) through the
/// wbgetentities endpoint. Ids keep their `Q` prefix end-to-end.
pub struct WikidataClient {
    http: RetryClient,
    client: reqwest::Client,
    api_url: String,
}

impl WikidataClient {
    pub fn new(base_url: &str) -> Result<Self, ImportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http: RetryClient::new(),
            client,
            api_url: format!("{}/w/api.php", base_url.trim_end_matches('/')),
        })
    }

    /// Resolve as many ids as possible. The result is a partial map: ids
    /// without a P373 claim are simply absent, and a whole failed batch
    /// degrades to no entries rather than failing the import.
    pub async fn fetch_categories(&self, ids: &[String]) -> HashMap<String, String> {
        let unique = dedup_ids(ids);
        let mut categories = HashMap::new();

        for (index, batch) in unique.chunks(WIKIDATA_BATCH).enumerate() {
            if index > 0 {
                tokio::time::sleep(WIKIDATA_BATCH_DELAY).await;
            }

            let request = self.client.get(&self.api_url).query(&[
                ("action", "wbgetentities".to_string()),
                ("format", "json".to_string()),
                ("formatversion", "2".to_string()),
                ("ids", batch.join("|")),
                ("props", "claims".to_string()),
            ]);

            match self.http.execute(request).await {
                Ok(value) => extract_categories(&value, &mut categories),
                Err(err) => {
                    log::warn!("wikidata batch {} failed: {}", index + 1, err);
                }
            }
        }

        categories
    }
}

fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Pull `claims.P373[0].mainsnak.datavalue.value` out of every present
/// entity. Entities flagged missing and entities without the claim are
/// skipped.
fn extract_categories(value: &serde_json::Value, categories: &mut HashMap<String, String>) {
    let Some(entities) = value.get("entities").and_then(|v| v.as_object()) else {
        return;
    };
    for (id, entity) in entities {
        if entity.get("missing").is_some() {
            continue;
        }
        let category = entity
            .pointer("/claims/P373/0/mainsnak/datavalue/value")
            .and_then(|v| v.as_str());
        if let Some(category) = category {
            categories.insert(id.clone(), category.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dedup_preserves_order_and_prefix() {
        let ids = ["Q5", "Q3", "Q5", "Q8", "Q3"].map(String::from);
        assert_eq!(dedup_ids(&ids), ["Q5", "Q3", "Q8"].map(String::from).to_vec());
    }

    #[test]
    fn extracts_present_claims() {
        let value = json!({
            "entities": {
                "Q31": {
                    "claims": {
                        "P373": [
                            {"mainsnak": {"datavalue": {"value": "Belgium"}}}
                        ]
                    }
                },
                "Q999999999": {"missing": ""},
                "Q42": {"claims": {}}
            }
        });

        let mut categories = HashMap::new();
        extract_categories(&value, &mut categories);

        assert_eq!(categories.len(), 1);
        assert_eq!(categories.get("Q31").map(String::as_str), Some("Belgium"));
        assert!(!categories.contains_key("Q42"));
    }

    #[test]
    fn malformed_payload_yields_nothing() {
        let mut categories = HashMap::new();
        extract_categories(&json!({"error": "bad request"}), &mut categories);
        extract_categories(&json!({"entities": []}), &mut categories);
        assert!(categories.is_empty());
    }
}
