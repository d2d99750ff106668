//! Decode throughput microbenchmark, grounded in the teacher's
//! `throughput-benchmark.rs`: load one model, run a prefill plus a fixed
//! number of decode steps, and report tokens/sec. Runs the CPU-reference
//! pipeline path directly (no GPU device is probed), the same path the
//! `criterion` benches under `benches/` exercise at a finer grain.

use clap::Parser;
use doppler::config::ApplicationConfig;
use doppler::facade::Engine;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(about = "Benchmark decode throughput for a loaded model")]
struct Args {
    /// Model id under the local model store.
    model_id: String,

    /// Local model store directory.
    #[arg(long, default_value = "./models")]
    models_dir: PathBuf,

    /// Prompt to prefill with.
    #[arg(long, default_value = "The quick brown fox")]
    prompt: String,

    /// Number of decode steps to time.
    #[arg(long, default_value_t = 32)]
    steps: usize,
}

fn main() {
    let args = Args::parse();

    let config = ApplicationConfig { models_dir: args.models_dir, ..ApplicationConfig::default() };
    let engine = Engine::new(config);

    let mut loaded = match engine.load_model(&args.model_id) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("✗ Failed to load '{}': {e}", args.model_id);
            std::process::exit(1);
        }
    };

    let prompt_tokens = match loaded.tokenizer.encode(&args.prompt) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("✗ Tokenization failed: {e}");
            std::process::exit(1);
        }
    };

    let prefill_start = Instant::now();
    let logits = match loaded.pipeline.prefill(&prompt_tokens) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("✗ Prefill failed: {e}");
            std::process::exit(1);
        }
    };
    let prefill_elapsed = prefill_start.elapsed();
    println!(
        "Prefill: {} tokens in {:.2?} ({:.1} tok/s)",
        prompt_tokens.len(),
        prefill_elapsed,
        prompt_tokens.len() as f64 / prefill_elapsed.as_secs_f64()
    );

    let sampler_opts = doppler::sampler::SamplerOptions::default();
    let mut rng = rand::thread_rng();
    let mut last_token = doppler::sampler::sample(&logits, &sampler_opts, &prompt_tokens, &mut rng);

    let decode_start = Instant::now();
    let mut decoded = 0usize;
    for _ in 0..args.steps {
        last_token = match loaded.pipeline.decode(last_token, &sampler_opts, &mut rng) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("stopped early: {e}");
                break;
            }
        };
        decoded += 1;
    }
    let decode_elapsed = decode_start.elapsed();
    println!(
        "Decode: {} tokens in {:.2?} ({:.1} tok/s)",
        decoded,
        decode_elapsed,
        decoded as f64 / decode_elapsed.as_secs_f64()
    );
}
