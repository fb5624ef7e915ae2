//! seoflow CLI: turn business hypotheses into published SEO content.
//!
//! Assembles project context, generates ideas and drafts through an LLM,
//! refines drafts in place, and publishes them to a CMS through a job queue.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;
use seoflow_shared::SeoflowError;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    let result = commands::run(cli).await;
    if let Err(report) = &result {
        if report
            .downcast_ref::<SeoflowError>()
            .is_some_and(SeoflowError::is_retryable)
        {
            eprintln!("hint: this failure is usually transient, running the command again may succeed");
        }
    }
    result
}
