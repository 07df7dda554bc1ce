//! OCR using AWS Textract.

use std::time::Duration;

use aws_sdk_textract::{
    primitives::Blob,
    types::{Block, BlockType, Document},
};
use leaky_bucket::RateLimiter;

use crate::{aws::load_aws_config, prelude::*};

use super::TextExtractor;

/// OCR engine wrapping the AWS Textract API.
pub struct TextractExtractor {
    /// AWS Textract client.
    client: aws_sdk_textract::Client,

    /// A rate limiter to avoid hitting API limits.
    rate_limiter: RateLimiter,
}

impl TextractExtractor {
    /// Create a new Textract-backed extractor, limited to
    /// `requests_per_second` API calls.
    pub async fn new(requests_per_second: usize) -> Result<Self> {
        let config = load_aws_config().await?;
        let client = aws_sdk_textract::Client::new(&config);
        let rate_limiter = RateLimiter::builder()
            .initial(requests_per_second)
            .refill(requests_per_second)
            .max(requests_per_second)
            .interval(Duration::from_secs(1))
            .build();
        Ok(Self {
            client,
            rate_limiter,
        })
    }
}

#[async_trait]
impl TextExtractor for TextractExtractor {
    #[instrument(level = "debug", skip_all, fields(bytes = bytes.len()))]
    async fn extract(&self, bytes: &[u8]) -> Result<Vec<String>> {
        // Rate limit the request.
        self.rate_limiter.acquire_one().await;

        let document = Document::builder()
            .bytes(Blob::new(bytes.to_vec()))
            .build();
        let response = self
            .client
            .detect_document_text()
            .document(document)
            .send()
            .await
            .map_err(|e| anyhow!("AWS Textract error: {e:?}"))?;
        trace!("Textract response: {response:#?}");

        let lines = line_blocks(response.blocks());
        debug!(line_count = lines.len(), "Extracted text");
        Ok(lines)
    }
}

/// Keep only the text of `LINE` blocks, in the order the backend returned
/// them. Textract interleaves page, line and word blocks in the same list;
/// everything except lines is structural and would duplicate the text.
fn line_blocks(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .filter(|block| block.block_type() == Some(&BlockType::Line))
        .filter_map(|block| block.text())
        .filter(|text| !text.trim().is_empty())
        .map(|text| text.to_owned())
        .collect()
}
