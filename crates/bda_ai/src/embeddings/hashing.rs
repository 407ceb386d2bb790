use bda_core::error::AppError;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::text::word_tokens;

/// Offline embedder: signed feature hashing of lowercase word tokens, L2-normalised.
///
/// Deterministic across runs and platforms. Texts sharing vocabulary score higher; there is no
/// semantic generalisation beyond that.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let mut v = vec![0.0f32; self.dims];
        for token in word_tokens(input) {
            let digest = Sha256::digest(token.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let h = u64::from_le_bytes(head);
            let bucket = (h % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn id(&self) -> String {
        format!("hashing:{}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_normalised() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("Refunds above 500 require approval").expect("embed");
        let b = e.embed("Refunds above 500 require approval").expect("embed");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let e = HashingEmbedder::new(64);
        assert_eq!(
            e.embed("Pricing, REVENUE!").expect("embed"),
            e.embed("pricing revenue").expect("embed")
        );
    }

    #[test]
    fn text_without_words_is_the_zero_vector() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed(" ,.; ").expect("embed").iter().all(|x| *x == 0.0));
    }
}
