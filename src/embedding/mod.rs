/// Dense text embedding
///
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local ONNX models (all-MiniLM-L6-v2, 384-dim by default)
/// - HashingProvider for model-free, deterministic embeddings
mod provider;

pub use provider::{
    fastembed_dimension, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashingProvider,
    FASTEMBED_MODELS,
};
