//! Summarization using the AWS Bedrock Converse API.

use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, StopReason,
};

use crate::{aws::load_aws_config, prelude::*};

use super::{Summarizer, summary_lines, truncate_chars};

/// The fixed instruction sent along with the document text. Keeping it fixed
/// makes results reproducible for identical input.
const SUMMARY_INSTRUCTION: &str = "Summarize this document in exactly 3 lines:";

/// Summarizer wrapping an Anthropic model on AWS Bedrock.
#[derive(Debug)]
pub struct BedrockSummarizer {
    /// The Bedrock client.
    client: aws_sdk_bedrockruntime::Client,

    /// Bedrock model id, e.g. `anthropic.claude-3-5-sonnet-20240620-v1:0`.
    model_id: String,

    /// Completion token budget for the summary.
    max_tokens: u32,

    /// Document text is truncated to this many characters before submission.
    max_input_chars: usize,
}

impl BedrockSummarizer {
    /// Create a new Bedrock-backed summarizer.
    pub async fn new(
        model_id: String,
        max_tokens: u32,
        max_input_chars: usize,
    ) -> Result<Self> {
        let config = load_aws_config().await?;
        Ok(Self {
            client: aws_sdk_bedrockruntime::Client::new(&config),
            model_id,
            max_tokens,
            max_input_chars,
        })
    }
}

#[async_trait]
impl Summarizer for BedrockSummarizer {
    #[instrument(level = "debug", skip_all, fields(chars = full_text.len()))]
    async fn summarize(&self, full_text: &str, max_lines: usize) -> Result<Vec<String>> {
        let text = truncate_chars(full_text, self.max_input_chars);
        let prompt = format!("{SUMMARY_INSTRUCTION}\n\n{text}");

        let message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(prompt))
            .build()
            .context("cannot build Bedrock message")?;
        let inference_config = InferenceConfiguration::builder()
            .max_tokens(self.max_tokens as i32)
            .build();

        let output = self
            .client
            .converse()
            .model_id(&self.model_id)
            .inference_config(inference_config)
            .messages(message)
            .send()
            .await
            .map_err(|e| anyhow!("AWS Bedrock error: {e:?}"))?;
        if output.stop_reason() != &StopReason::EndTurn {
            // A max-tokens stop still carries usable text; just note it.
            warn!("Unexpected stop reason: {}", output.stop_reason());
        }

        // Dig the generated text out of the converse output. Any missing
        // layer is a malformed response.
        let message = output
            .output()
            .ok_or_else(|| anyhow!("Bedrock response did not contain any output"))?
            .as_message()
            .map_err(|_| anyhow!("Bedrock response did not contain a message"))?;
        let text = message
            .content()
            .iter()
            .find_map(|block| match block {
                ContentBlock::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .ok_or_else(|| anyhow!("Bedrock response did not contain any text"))?;
        debug!(%text, "Summary response");

        Ok(summary_lines(text, max_lines))
    }
}
