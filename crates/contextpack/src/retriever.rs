//! Retrieval Client (C5): a thin HTTP proxy to the external ingest/retrieval
//! service, grounded in `retriever.py`'s `KBRetriever.search`.
//!
//! The ingest service does model warmup at startup, so a long retry window
//! with exponential backoff is deliberate — and failure is swallowed into an
//! empty result rather than failing the turn.

use std::time::Duration;

use serde::Deserialize;

use sa_domain::model::Chunk;

const MAX_ATTEMPTS: u32 = 8;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    chunks: Vec<ChunkWire>,
}

#[derive(Debug, Deserialize)]
struct ChunkWire {
    id: serde_json::Value,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default)]
    score: Option<f64>,
}

impl From<ChunkWire> for Chunk {
    fn from(w: ChunkWire) -> Self {
        let id = match w.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Chunk { id, text: w.text, metadata: w.metadata, score: w.score }
    }
}

pub struct RetrievalClient {
    base_url: String,
    client: reqwest::Client,
}

impl RetrievalClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builder never fails with this configuration");
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), client }
    }

    /// Search the knowledge base. Retries up to 8 times with backoff
    /// `min(8.0s, 0.5 * 2^(attempt-1))`; returns an empty vec (never an
    /// error) once the retry budget is exhausted, so a flaky retrieval
    /// service degrades the answer instead of failing the turn.
    pub async fn search(&self, query: &str) -> Vec<Chunk> {
        let url = format!("{}/search", self.base_url);
        let body = serde_json::json!({"query": query, "with_debug": false});

        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_search(&url, &body).await {
                Ok(chunks) => return chunks,
                Err(e) => {
                    tracing::warn!(attempt, base_url = %self.base_url, error = %e, "kb_search_failed");
                    let delay = (0.5_f64 * 2f64.powi(attempt as i32 - 1)).min(8.0);
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                }
            }
        }
        Vec::new()
    }

    async fn try_search(&self, url: &str, body: &serde_json::Value) -> Result<Vec<Chunk>, reqwest::Error> {
        let response = self.client.post(url).json(body).send().await?.error_for_status()?;
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.chunks.into_iter().map(Chunk::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_wire_converts_non_string_id_to_string() {
        let wire = ChunkWire {
            id: serde_json::json!(42),
            text: "hello".into(),
            metadata: Default::default(),
            score: Some(0.9),
        };
        let chunk: Chunk = wire.into();
        assert_eq!(chunk.id, "42");
        assert_eq!(chunk.text, "hello");
        assert_eq!(chunk.score, Some(0.9));
    }

}
