//! Label Matcher - Main entry point

use clap::Parser;
use label_common::logging::{init_logging, LogConfig, LogLevel};
use label_matcher::{commands, Cli, Commands};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `.env` feeds logging as well as every command's configuration
    label_matcher::config::load_dotenv();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("label-matcher")
        .filter_directives("aws_smithy_runtime=warn,aws_config=warn,hyper=info")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        }
    };

    let result = match &cli.command {
        Commands::Process { batch } => commands::process(batch.as_deref()).await,
        Commands::List { folder, json } => commands::list(*folder, *json).await,
        Commands::Retry { key, all } => commands::retry(key.as_deref(), *all).await,
        Commands::MarkPrinted { keys } => commands::mark_printed(keys).await,
        Commands::Clear { folder } => commands::clear(*folder).await,
        Commands::Select { folder, order_ids } => commands::select(*folder, order_ids).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        drop(guard);
        process::exit(1);
    }
}
