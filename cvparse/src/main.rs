use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use cvparse_core::BatchConfig;
use cvparse_lib::cli::AuditOptions;

#[derive(Parser, Debug)]
#[command(name = "cvparse")]
#[command(about = "Extract structured records from uploaded resume PDFs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one queue batch event and print the handler response
    Process {
        /// JSON file with a batch of queue messages
        event_file: PathBuf,
        /// Print per-document outcomes instead of the handler response
        #[arg(long)]
        report: bool,
    },
    /// Read one notification per stdin line and process them in batches
    Worker {
        /// Maximum messages per batch
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
        /// Milliseconds to hold a partial batch
        #[arg(long, default_value_t = 1000)]
        batch_wait_ms: u64,
    },
    /// Check which input documents have an output artifact
    Audit {
        /// Input bucket (defaults to INPUT_BUCKET)
        #[arg(long)]
        input_bucket: Option<String>,
        /// Output bucket (defaults to OUTPUT_BUCKET)
        #[arg(long)]
        output_bucket: Option<String>,
        /// Key prefix in the input bucket
        #[arg(long, default_value = "")]
        input_prefix: String,
        /// Key prefix in the output bucket
        #[arg(long, default_value = "")]
        output_prefix: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    cvparse_lib::init_logging(&["cvparse=info", "cvparse_core=info", "cvparse_lib=info"]);

    let result = match args.command {
        Command::Process { event_file, report } => cvparse_lib::cli::process(&event_file, report),
        Command::Worker {
            batch_size,
            batch_wait_ms,
        } => cvparse_lib::headless::run(BatchConfig {
            max_size: batch_size.max(1),
            max_wait: Duration::from_millis(batch_wait_ms),
        })
        .map(|()| ExitCode::SUCCESS),
        Command::Audit {
            input_bucket,
            output_bucket,
            input_prefix,
            output_prefix,
        } => cvparse_lib::cli::audit(AuditOptions {
            input_bucket,
            output_bucket,
            input_prefix,
            output_prefix,
        }),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
