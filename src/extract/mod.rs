//! Text extraction from document bytes.

pub mod textract;

use crate::prelude::*;

/// Capability interface over an OCR backend.
///
/// Implementations return line-level text in the backend's reading order,
/// with structural blocks (pages, words, tables) already discarded. A hard
/// backend fault must propagate as an error and never as a partial result;
/// a document that genuinely contains no text is a successful empty result,
/// which the pipeline treats as a business outcome rather than a fault.
#[async_trait]
pub trait TextExtractor: Send + Sync + 'static {
    /// Extract the non-empty text lines from a document.
    async fn extract(&self, bytes: &[u8]) -> Result<Vec<String>>;
}
