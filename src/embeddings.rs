use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Output size of the hashing embedder
const LITE_DIM: usize = 384;

/// Default socket path for the embedding server
pub const SOCKET_PATH: &str = "/tmp/reverie-embedder.sock";

/// Largest response accepted from the server
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// Text to vector provider. `embed_batch` preserves input order.
pub trait Embedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| "Embedder returned no vectors".to_string())
    }
}

// =============================================================================
// LiteEmbedder - signed feature hashing (pure Rust, no model)
// =============================================================================

/// Lightweight embedder hashing character trigrams, words and word pairs
pub struct LiteEmbedder {
    dim: usize,
}

impl Default for LiteEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl LiteEmbedder {
    pub fn new() -> Self {
        Self { dim: LITE_DIM }
    }

    #[cfg(test)]
    pub fn with_dim(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = md5_hash(feature);
        let idx = (hash % self.dim as u128) as usize;
        // High bit picks the sign so colliding features tend to cancel
        let sign = if hash >> 127 == 1 { -1.0 } else { 1.0 };
        vector[idx] += sign * weight;
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut vector = vec![0.0f32; self.dim];

        for word in &words {
            self.add_feature(&mut vector, word, 2.0);

            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &trigram, 1.0);
            }
        }

        for pair in words.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 1.0);
        }

        normalize(&mut vector);
        vector
    }
}

impl Embedder for LiteEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// MD5 digest read as a big-endian integer
fn md5_hash(text: &str) -> u128 {
    u128::from_be_bytes(Md5::digest(text.as_bytes()).into())
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

// =============================================================================
// ServerEmbedder - Unix socket client for an external embedding daemon
// =============================================================================

#[derive(Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request<'a> {
    Ping,
    EmbedBatch { texts: &'a [&'a str] },
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Response {
    ok: bool,
    model: Option<String>,
    embeddings: Option<Vec<Vec<f32>>>,
    error: Option<String>,
}

impl Response {
    fn check(self) -> Result<Self, String> {
        if self.ok {
            Ok(self)
        } else {
            Err(self.error.unwrap_or_else(|| "Unknown error".to_string()))
        }
    }
}

/// Embedder backed by an embedding server listening on a Unix socket
pub struct ServerEmbedder {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for ServerEmbedder {
    fn default() -> Self {
        Self::new(SOCKET_PATH)
    }
}

impl ServerEmbedder {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Check if the server is reachable
    pub fn is_running(&self) -> bool {
        Path::new(&self.socket_path).exists() && self.model().is_ok()
    }

    /// Ask the server which model it serves
    pub fn model(&self) -> Result<String, String> {
        let response = self.send(&Request::Ping)?.check()?;
        Ok(response.model.unwrap_or_default())
    }

    fn io_error(&self, what: &str, e: std::io::Error) -> String {
        format!("{} ({}): {}", what, self.socket_path.display(), e)
    }

    /// One request per connection: write the JSON body, half-close, read
    /// until the server hangs up.
    fn send(&self, request: &Request<'_>) -> Result<Response, String> {
        let body = serde_json::to_vec(request).map_err(|e| format!("Bad request: {}", e))?;
        let mut stream = UnixStream::connect(&self.socket_path).map_err(|e| self.io_error("connect", e))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| self.io_error("set timeout", e))?;
        stream.write_all(&body).map_err(|e| self.io_error("write", e))?;
        stream
            .shutdown(std::net::Shutdown::Write)
            .map_err(|e| self.io_error("half-close", e))?;

        let mut raw = Vec::new();
        stream
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut raw)
            .map_err(|e| self.io_error("read", e))?;
        serde_json::from_slice(&raw).map_err(|e| format!("Bad response: {}", e))
    }
}

impl Embedder for ServerEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .send(&Request::EmbedBatch { texts })?
            .check()?
            .embeddings
            .ok_or_else(|| "No embeddings in response".to_string())?;

        if embeddings.len() != texts.len() {
            return Err(format!(
                "Server returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            ));
        }
        Ok(embeddings)
    }
}

// =============================================================================
// Cosine similarity
// =============================================================================

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut aa, mut bb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        aa += x * x;
        bb += y * y;
    }

    if aa == 0.0 || bb == 0.0 {
        return 0.0;
    }
    dot / (aa.sqrt() * bb.sqrt())
}

/// Cosine distance in [0, 2]. Degenerate vectors sit at 1.0.
pub fn cosine_distance(vec_a: &[f32], vec_b: &[f32]) -> f64 {
    (1.0 - cosine_similarity(vec_a, vec_b)).clamp(0.0, 2.0)
}

// =============================================================================
// Embedder factory
// =============================================================================

/// Pick an embedder for `model_name`, falling back to the hashing one
pub fn get_embedder(model_name: &str, model_type: &str, use_server: bool) -> Box<dyn Embedder> {
    if model_type == "lite" || model_name == "lite" {
        return Box::new(LiteEmbedder::new());
    }

    let server = ServerEmbedder::default();
    if use_server && server.is_running() {
        match server.model() {
            Ok(served) if served == model_name => {
                debug!("Using embedding server with model {}", served);
                return Box::new(server);
            }
            Ok(served) => warn!("Embedding server runs {} but {} was requested", served, model_name),
            Err(e) => warn!("Embedding server ping failed: {}", e),
        }
    }

    warn!("Embedding server not available at {}. Using lite embedder.", SOCKET_PATH);
    Box::new(LiteEmbedder::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_lite_vectors_are_unit_length() {
        let lite = LiteEmbedder::new();
        for text in ["a walk by the sea", "Consolidation", "x"] {
            let v = lite.embed(text).unwrap();
            assert_eq!(v.len(), LITE_DIM);
            assert!((norm(&v) - 1.0).abs() < 1e-4);
        }
        assert_eq!(LiteEmbedder::with_dim(16).embed("tiny").unwrap().len(), 16);
    }

    #[test]
    fn test_lite_ignores_case_and_punctuation() {
        let lite = LiteEmbedder::new();
        let a = lite.embed("Hiking in the mountains!").unwrap();
        let b = lite.embed("hiking in the mountains").unwrap();
        assert!(cosine_distance(&a, &b) < 1e-5);
    }

    #[test]
    fn test_blank_text_is_zero_vector() {
        let v = LiteEmbedder::new().embed("  ...  ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_word_overlap_means_closer() {
        let lite = LiteEmbedder::new();
        let dog = lite.embed("walked the dog along the river").unwrap();
        let dog2 = lite.embed("walked the dog along the canal").unwrap();
        let tax = lite.embed("quarterly tax filing deadline").unwrap();
        assert!(cosine_distance(&dog, &dog2) < cosine_distance(&dog, &tax));
    }

    #[test]
    fn test_batch_matches_single() {
        let lite = LiteEmbedder::new();
        let batch = lite.embed_batch(&["alpha", "beta"]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], lite.embed("alpha").unwrap());
        assert_eq!(batch[1], lite.embed("beta").unwrap());
    }

    #[test]
    fn test_cosine_helpers() {
        let x = [1.0, 0.0];
        let y = [0.0, 2.0];
        let neg = [-3.0, 0.0];
        assert!((cosine_similarity(&x, &[5.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&x, &y).abs() < 1e-9);
        assert!((cosine_distance(&x, &neg) - 2.0).abs() < 1e-9);
        assert!((cosine_distance(&x, &[0.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&x, &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unreachable_server() {
        let server = ServerEmbedder::new("/nonexistent/reverie.sock");
        assert!(!server.is_running());
        assert!(server.embed("x").is_err());
        assert!(server.embed_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_factory_lite() {
        let embedder = get_embedder("lite", "lite", true);
        assert_eq!(embedder.embed("hello").unwrap().len(), LITE_DIM);
    }
}
