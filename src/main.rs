use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use docbrief::{
    cmd::{self, process::ProcessOpts, serve::ServeOpts},
    prelude::*,
};

/// Extract text from uploaded documents and summarize it.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
Environment Variables:
  - SUMMARY_MODEL_ID (optional): Override the Bedrock model used for
    summaries.

  Standard AWS environment variables and credential files are used for
  Textract and Bedrock.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run the HTTP service: synchronous processing plus upload/poll jobs.
    Serve(ServeOpts),
    /// Process a single local document and print the JSON result.
    Process(ProcessOpts),
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main().await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Serve(opts) => cmd::serve::cmd_serve(opts).await?,
        Cmd::Process(opts) => cmd::process::cmd_process(opts).await?,
    }
    Ok(())
}
