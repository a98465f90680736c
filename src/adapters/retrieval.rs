//! HTTP client for the knowledge-base retrieval service.
//!
//! Endpoint: POST <url> with `{"collection", "query", "n_results"}`
//! Response: `{"documents": [...]}` or the vector-store shape
//! `{"documents": [[...]]}` (one list per query).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::KnowledgeBase;

/// Knowledge base served by a retrieval service
pub struct HttpKnowledgeBase {
    endpoint: String,
    collection: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    collection: &'a str,
    query: &'a str,
    n_results: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Documents,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Documents {
    Flat(Vec<String>),
    PerQuery(Vec<Vec<String>>),
}

impl Default for Documents {
    fn default() -> Self {
        Documents::Flat(Vec::new())
    }
}

impl Documents {
    fn into_first(self) -> Vec<String> {
        match self {
            Documents::Flat(docs) => docs,
            Documents::PerQuery(mut per_query) => {
                if per_query.is_empty() {
                    Vec::new()
                } else {
                    per_query.swap_remove(0)
                }
            }
        }
    }
}

impl HttpKnowledgeBase {
    /// Create a new client
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client,
        })
    }
}

#[async_trait]
impl KnowledgeBase for HttpKnowledgeBase {
    async fn search(&self, query: &str, n_results: usize) -> Result<Vec<String>> {
        let request = QueryRequest {
            collection: &self.collection,
            query,
            n_results,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach retrieval service at {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Retrieval error ({}): {}", status, text.trim());
        }

        let body: QueryResponse = response
            .json()
            .await
            .context("Failed to parse retrieval response")?;

        let mut docs = body.documents.into_first();
        docs.truncate(n_results);
        Ok(docs)
    }
}
