//! Stand-alone downloader invocation, grounded in the teacher's
//! `download-mistral.rs` bin: a single clap struct, no subcommands, driven
//! straight off `facade::Engine` rather than going through the server.

use clap::Parser;
use doppler::config::ApplicationConfig;
use doppler::facade::Engine;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Download a model's shards into the local model store")]
struct Args {
    /// Base URL serving `manifest.json` and shard files.
    #[arg(long)]
    base_url: String,

    /// Model id to store it under; defaults to whatever the manifest names.
    #[arg(long)]
    model_id: Option<String>,

    /// Local model store directory.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Concurrent shard fetches.
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() {
    doppler::logging::init_logging();
    let args = Args::parse();

    let mut config = ApplicationConfig::default();
    if let Some(dir) = args.models_dir {
        config.models_dir = dir;
    }
    let engine = Engine::new(config);

    println!("Pulling model from {}", args.base_url);
    match engine
        .download_model(&args.base_url, args.model_id.as_deref(), args.concurrency, None)
        .await
    {
        Ok(completion) => {
            println!(
                "✓ Done: {} ({} shards fetched)",
                completion.model_id, completion.shards_fetched
            );
        }
        Err(e) => {
            eprintln!("✗ Download failed: {e}");
            std::process::exit(1);
        }
    }
}
