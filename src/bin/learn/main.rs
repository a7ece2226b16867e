use anyhow::Result;
use arpa::{Config, LearnOptions, logging, record_trace};
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;

/// Record a browser task once, under model guidance, as a replayable trace.
#[derive(Parser, Debug)]
#[command(name = "learn", version)]
struct Args {
    /// What the agent should do in the browser.
    prompt: String,

    /// Base path of the trace; writes <base>.json and <base>.meta.json.
    #[arg(long, default_value = "steps")]
    output_file: PathBuf,

    /// Environment variables whose values are replaced by {{NAME}} placeholders.
    #[arg(long, num_args = 1.., default_values = ["USER", "PASS", "BASE_URL"])]
    env_keys: Vec<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    logging::init();
    let args = Args::parse();
    let config = Config::from_env();

    let mut options = LearnOptions::from_config(&config);
    options.env_keys = args.env_keys;
    if let Some(model) = args.model {
        options.model = model;
    }
    if let Some(temperature) = args.temperature {
        options.temperature = temperature;
    }

    println!("Recording task with {}: {}", options.model, args.prompt);
    let (metadata_path, payload) =
        record_trace(&args.prompt, &args.output_file, &options, &config).await?;

    println!("Trace recorded. Metadata (with raw actions for debugging) in {}", metadata_path.display());
    println!("{payload}");
    Ok(())
}
