use anyhow::Result;
use arpa::envelope;
use arpa::hands::ChromeDriver;
use arpa::replay::{ReplayOptions, StepStatus, replay_trace_with};
use arpa::vars::{parse_overrides, prompt_stdin};
use arpa::{Config, logging};
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;

/// Replay a recorded trace deterministically, without a model.
#[derive(Parser, Debug)]
#[command(name = "replay", version)]
struct Args {
    /// Base path of the trace to replay (<base>.json).
    #[arg(default_value = "steps")]
    filename: PathBuf,

    /// Variable values: -o USER=foo PASS=bar BASE_URL=https://...
    #[arg(short = 'o', long = "override", num_args = 1..)]
    overrides: Vec<String>,

    /// Abort on the first failing step instead of logging and moving on.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    logging::init();
    let args = Args::parse();
    let config = Config::from_env();

    let options = ReplayOptions {
        tolerant: !args.strict,
        step_timeout: config.step_timeout,
    };
    let driver = ChromeDriver::new(config.browser.clone());
    let overrides = parse_overrides(&args.overrides);

    println!("Replaying {}", args.filename.display());
    let outcome = replay_trace_with(driver, &args.filename, &overrides, prompt_stdin, options).await?;

    for report in &outcome.reports {
        if let StepStatus::Failed { message } = &report.status {
            println!("Step {} ({}) failed: {}", report.position, report.name, message);
        }
    }
    println!("{}", envelope::payload(outcome.result.as_deref()));
    Ok(())
}
