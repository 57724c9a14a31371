//! `Embedder`: the capability behind the cosine-similarity comparisons in
//! §4.2 (historical workflow filtering) and §4.8 (speculative state
//! matching). Resolves the spec's embedding Open Question with a
//! deterministic, dependency-free default (see DESIGN.md).

/// Produces a fixed-width vector embedding for a piece of text.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// A deterministic bag-of-trigram-hashes embedder. No model weights, no
/// network call — every call is a pure function of its input, which keeps
/// the cosine-similarity thresholds in §4.2/§4.8 reproducible in tests.
pub struct HashingEmbedder {
    dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dims: 256 }
    }
}

impl HashingEmbedder {
    pub fn with_dims(dims: usize) -> Self {
        Self { dims }
    }

    fn trigrams(text: &str) -> Vec<String> {
        let normalized: String = text.to_lowercase();
        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() < 3 {
            return vec![normalized];
        }
        chars
            .windows(3)
            .map(|w| w.iter().collect::<String>())
            .collect()
    }

    fn hash_to_bucket(&self, s: &str) -> usize {
        // FNV-1a, inlined to avoid a hashing dependency for a purely
        // internal bucket index.
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in s.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash as usize) % self.dims
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0f32; self.dims];
        for trigram in Self::trigrams(text) {
            let bucket = self.hash_to_bucket(&trigram);
            vec[bucket] += 1.0;
        }
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for a
/// zero vector on either side rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
