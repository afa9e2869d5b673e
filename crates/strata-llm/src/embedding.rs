use async_trait::async_trait;
use strata_core::{Result, StrataError};
use tracing::debug;

/// Trait for generating text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// The dimensionality of the output embeddings.
    fn dimensions(&self) -> usize;

    /// Provider name.
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])
            .await?
            .pop()
            .ok_or_else(|| StrataError::Embedding(format!("{} returned no vector", self.name())))
    }
}

fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
}

/// OpenAI-compatible embeddings endpoint (`POST {base}/embeddings`).
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedding {
    /// text-embedding-3-small (1536 dims).
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            model: "text-embedding-3-small".into(),
            dims: 1536,
        }
    }

    pub fn with_model(mut self, model: String, dims: usize) -> Self {
        self.model = model;
        self.dims = dims;
        self
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(model = %self.model, count = texts.len(), "generating embeddings");

        let body = serde_json::json!({
            "model": &self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| StrataError::Embedding(format!("embedding request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(StrataError::Embedding(format!("embedding HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StrataError::Embedding(format!("embedding parse error: {e}")))?;

        let embeddings: Vec<Vec<f32>> = data["data"]
            .as_array()
            .map(|items| items.iter().filter_map(|item| parse_vector(&item["embedding"])).collect())
            .unwrap_or_default();

        if embeddings.len() != texts.len() {
            return Err(StrataError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Ollama embeddings provider (uses the /api/embeddings endpoint).
pub struct OllamaEmbedding {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedding {
    pub fn new(model: &str, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "http://127.0.0.1:11434".into(),
            model: model.to_string(),
            dims,
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for text in texts {
            let body = serde_json::json!({
                "model": &self.model,
                "prompt": text,
            });

            let resp = self
                .client
                .post(format!("{}/api/embeddings", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| StrataError::Embedding(format!("ollama embedding: {e}")))?;

            if !resp.status().is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(StrataError::Embedding(format!("ollama embedding error: {text}")));
            }

            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| StrataError::Embedding(e.to_string()))?;

            match parse_vector(&data["embedding"]) {
                Some(embedding) if !embedding.is_empty() => results.push(embedding),
                _ => {
                    return Err(StrataError::Embedding(format!(
                        "ollama returned no embedding for model {}",
                        self.model
                    )));
                }
            }
        }

        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Offline embedder: hashes word and CJK character features into a fixed
/// number of buckets and L2-normalizes. Texts sharing terms land close
/// together, which is enough for tests and air-gapped demos.
pub struct HashEmbedding {
    dims: usize,
}

impl HashEmbedding {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for feature in tokenize(text) {
            let hash = Self::fnv1a(feature.as_bytes());
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// Lower-cased alphanumeric words; CJK text yields one token per character.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

/// CJK ideographs, kana, and hangul are indexed one character per term.
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xAC00..=0xD7AF
        | 0xF900..=0xFAFF
        | 0x20000..=0x2FA1F)
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "hash"
    }
}
