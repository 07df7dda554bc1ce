//! The `process` subcommand.

use clap::Args;
use tokio::fs;

use crate::prelude::*;

use super::BackendOpts;

/// Options for the `process` subcommand.
#[derive(Args, Clone, Debug)]
pub struct ProcessOpts {
    /// The document to process (PDF, JPEG or PNG).
    pub input: PathBuf,

    /// Where to write the JSON result. Defaults to standard output.
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[clap(flatten)]
    pub backend: BackendOpts,
}

/// The `process` subcommand: run one local file through the same inline
/// pipeline the synchronous endpoint uses, against the real backends.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_process(opts: &ProcessOpts) -> Result<()> {
    let content_type = mime_guess::from_path(&opts.input)
        .first_or_octet_stream()
        .essence_str()
        .to_owned();
    let bytes = fs::read(&opts.input)
        .await
        .with_context(|| format!("failed to read {:?}", opts.input))?;

    let pipeline = opts.backend.build_pipeline().await?;
    pipeline.check_intake(bytes.len(), &content_type)?;
    let outcome = pipeline.process_document(&bytes).await?;

    let result = serde_json::json!({
        "extracted_text": outcome.full_text(),
        "summary": outcome.summary,
        "extracted_fields": outcome.fields,
    });
    let rendered = serde_json::to_string_pretty(&result)?;
    match &opts.output {
        Some(path) => fs::write(path, rendered)
            .await
            .with_context(|| format!("failed to write {path:?}"))?,
        None => println!("{rendered}"),
    }
    Ok(())
}
