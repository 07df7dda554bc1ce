//! Command-line entry points.

use std::{sync::Arc, time::Duration};

use clap::Args;

use crate::{
    blob::MemoryBlobStore,
    extract::textract::TextractExtractor,
    jobs::store::MemoryJobStore,
    pipeline::{Pipeline, PipelineOpts},
    prelude::*,
    summarize::bedrock::BedrockSummarizer,
};

pub mod process;
pub mod serve;

/// Options shared by every command that runs the processing pipeline.
#[derive(Args, Clone, Debug)]
pub struct BackendOpts {
    /// The Bedrock model used for summaries.
    #[clap(
        long,
        env = "SUMMARY_MODEL_ID",
        default_value = "anthropic.claude-3-5-sonnet-20240620-v1:0"
    )]
    pub model: String,

    /// An upper limit on the number of completion tokens in a summary.
    #[clap(long, default_value = "200")]
    pub max_completion_tokens: u32,

    /// Truncate document text to this many characters before summarizing.
    #[clap(long, default_value = "12000")]
    pub max_summary_input_chars: usize,

    /// Max Textract requests per second.
    #[clap(long, default_value = "4")]
    pub ocr_requests_per_second: usize,

    /// The largest document we accept, in bytes.
    #[clap(long, default_value = "10485760")]
    pub max_document_bytes: usize,

    /// A total deadline, in seconds, for OCR plus summarization of one
    /// document.
    #[clap(long, default_value = "60")]
    pub processing_timeout: u64,
}

impl BackendOpts {
    /// The pipeline limits these options describe.
    pub fn pipeline_opts(&self) -> PipelineOpts {
        PipelineOpts {
            max_document_bytes: self.max_document_bytes,
            summary_max_lines: 3,
            processing_timeout: Duration::from_secs(self.processing_timeout),
        }
    }

    /// Build a pipeline backed by the real AWS capabilities and in-process
    /// storage.
    pub async fn build_pipeline(&self) -> Result<Pipeline> {
        let extractor = TextractExtractor::new(self.ocr_requests_per_second).await?;
        let summarizer = BedrockSummarizer::new(
            self.model.clone(),
            self.max_completion_tokens,
            self.max_summary_input_chars,
        )
        .await?;
        Ok(Pipeline::new(
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(extractor),
            Arc::new(summarizer),
            self.pipeline_opts(),
        ))
    }
}
