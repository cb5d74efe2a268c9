//! # VectorStore
//!
//! The retrieval half of the assistant: a tiny, immutable corpus of reference
//! documents, one embedding per document, and a nearest-neighbor lookup over them.
//!
//! ## Responsibilities
//! - **Indexing**: [`SimilarityIndex`] is the seam for the nearest-neighbor search.
//!   [`FlatIndex`] is an exact brute-force implementation using squared Euclidean
//!   distance; ties go to the lowest index.
//! - **Association**: [`KnowledgeBase`] keeps the corpus and its vector set as
//!   parallel arrays built once at startup and never mutated afterwards.
//!
//! ## Quick Example
//! ```
//! use fin_chat::vector_store::{FlatIndex, SimilarityIndex};
//!
//! let index = FlatIndex::build(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
//! assert_eq!(index.query(&[0.9, 0.1]).unwrap(), 1);
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::{embeddings::Embedder, errors::BoxError};

/// The reference corpus, in index order.
pub const DEFAULT_DOCUMENTS: [&str; 5] = [
    "Stock market is volatile due to inflation and interest rates.",
    "Bitcoin and Ethereum are leading cryptocurrencies with high volatility.",
    "Long-term investments in index funds like S&P 500 offer stable returns.",
    "The Federal Reserve plays a key role in economic policy and interest rates.",
    "Cryptocurrency regulations vary across different countries and impact adoption.",
];

/// Nearest-neighbor search over a fixed set of vectors.
pub trait SimilarityIndex: Send + Sync {
    /// Index `vectors`; positions in the input are the ids returned by [`query`](Self::query).
    ///
    /// # Errors
    /// - `"no vectors to index"` for an empty input.
    /// - `"dimension mismatch"` if the vectors are not all the same length.
    fn build(vectors: Vec<Vec<f32>>) -> Result<Self, &'static str>
    where
        Self: Sized;

    fn len(&self) -> usize;

    fn dimension(&self) -> usize;

    /// Position of the stored vector nearest to `vector`.
    ///
    /// # Errors
    /// `"dimension mismatch"` if `vector.len() != self.dimension()`.
    fn query(&self, vector: &[f32]) -> Result<usize, &'static str>;
}

/// Exact linear-scan index. O(n × d) per query.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl SimilarityIndex for FlatIndex {
    fn build(vectors: Vec<Vec<f32>>) -> Result<Self, &'static str> {
        let dimension = vectors.first().ok_or("no vectors to index")?.len();
        if vectors.iter().any(|v| v.len() != dimension) {
            return Err("dimension mismatch");
        }
        Ok(Self { vectors, dimension })
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn query(&self, vector: &[f32]) -> Result<usize, &'static str> {
        if vector.len() != self.dimension {
            return Err("dimension mismatch");
        }

        let mut best = 0;
        let mut best_distance = f32::INFINITY;
        for (i, stored) in self.vectors.iter().enumerate() {
            let distance = squared_euclidean_distance(stored, vector);
            // strict comparison keeps the first of equal candidates
            if distance < best_distance {
                best = i;
                best_distance = distance;
            }
        }
        Ok(best)
    }
}

/// Compute squared Euclidean distance between two equal-length vectors: `Σ (a[i] - b[i])^2`.
pub fn squared_euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// The corpus, its vector set, and the embedder that produced it.
pub struct KnowledgeBase {
    documents: Vec<String>,
    index: Box<dyn SimilarityIndex>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeBase {
    /// Embed every document and index the vectors with a [`FlatIndex`].
    pub fn build(documents: Vec<String>, embedder: Arc<dyn Embedder>) -> Result<Self, BoxError> {
        Self::build_with::<FlatIndex>(documents, embedder)
    }

    /// Same as [`build`](Self::build) with a caller-chosen index implementation.
    pub fn build_with<I: SimilarityIndex + 'static>(
        documents: Vec<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, BoxError> {
        let vectors = documents
            .iter()
            .map(|d| embedder.embed(d))
            .collect::<Result<Vec<_>, _>>()?;

        if vectors.iter().any(|v| v.len() != embedder.dimension()) {
            return Err("embedder returned a vector of unexpected dimension".into());
        }

        let index = I::build(vectors)?;
        debug!(
            "Indexed {} documents ({} dimensions)",
            index.len(),
            index.dimension()
        );

        Ok(Self {
            documents,
            index: Box::new(index),
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// Embed `query` and return the nearest document with its position.
    pub fn retrieve(&self, query: &str) -> Result<(usize, &str), BoxError> {
        let vector = self.embedder.embed(query)?;
        let id = self.index.query(&vector)?;
        let document = self
            .documents
            .get(id)
            .ok_or("index returned an id outside the corpus")?;
        Ok((id, document.as_str()))
    }
}
