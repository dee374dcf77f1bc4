//! Content-embedding client for usage events.
//!
//! Wraps an OpenAI-compatible batch embeddings endpoint. The client is
//! strictly best-effort: every failure logs and yields `None`, and the
//! pipeline continues with a null embedding (the matcher then skips the
//! semantic strategy).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EmbeddingSettings;

/// Fields contributing to one event's content embedding.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingInput {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// Join the non-null fields as `Title: T | Artist: A | Album: L`.
/// Returns `None` when every field is absent.
pub fn content_text(
    title: Option<&str>,
    artist: Option<&str>,
    album: Option<&str>,
) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(title) = title {
        parts.push(format!("Title: {title}"));
    }
    if let Some(artist) = artist {
        parts.push(format!("Artist: {artist}"));
    }
    if let Some(album) = album {
        parts.push(format!("Album: {album}"));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Shared HTTPS client for the embedding provider; safe for concurrent use.
#[derive(Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    batch_size: usize,
}

impl EmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            batch_size: settings.batch_size.max(1),
        }
    }

    /// Embed a single event's content. `None` on empty content or failure.
    pub async fn embed_event(
        &self,
        title: Option<&str>,
        artist: Option<&str>,
        album: Option<&str>,
    ) -> Option<Vec<f32>> {
        let input = EmbeddingInput {
            title: title.map(str::to_string),
            artist: artist.map(str::to_string),
            album: album.map(str::to_string),
        };
        self.embed_batch(&[input]).await.pop().flatten()
    }

    /// Embed a batch of items. The returned list is positionally aligned
    /// with the input: empty-content items map to `None` without consuming
    /// a batch slot, and a failed provider call nulls out only the items of
    /// that batch.
    pub async fn embed_batch(&self, items: &[EmbeddingInput]) -> Vec<Option<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; items.len()];

        let non_empty: Vec<(usize, String)> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                content_text(
                    item.title.as_deref(),
                    item.artist.as_deref(),
                    item.album.as_deref(),
                )
                .map(|text| (i, text))
            })
            .collect();

        if non_empty.is_empty() {
            return results;
        }
        if self.api_key.is_empty() {
            warn!("embedding provider is not configured, events will carry null embeddings");
            return results;
        }

        for chunk in non_empty.chunks(self.batch_size) {
            let inputs: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
            match self.request(&inputs).await {
                Ok(embeddings) => {
                    for (slot, embedding) in chunk.iter().zip(embeddings) {
                        results[slot.0] = embedding;
                    }
                }
                Err(err) => {
                    warn!(
                        batch_len = chunk.len(),
                        error = %err,
                        "embedding batch failed, continuing with null embeddings"
                    );
                }
            }
        }

        results
    }

    async fn request(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Option<Vec<f32>>>, reqwest::Error> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: inputs,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        // The provider orders results by index; place them explicitly so a
        // short or shuffled response cannot misalign embeddings.
        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; inputs.len()];
        for data in response.data {
            if data.index < embeddings.len() {
                embeddings[data.index] = Some(data.embedding);
            }
        }

        debug!(count = inputs.len(), "embedding batch completed");
        Ok(embeddings)
    }
}
