//! Shard integrity check, grounded in the teacher's `verify-gguf.rs`/
//! `verify-safetensors.rs` bins: a small clap front end over one verification
//! routine, printing a pass/fail summary and exiting non-zero on mismatch.

use clap::Parser;
use doppler::store::ShardStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Verify a model's on-disk shards against its manifest hashes")]
struct Args {
    /// Model id under the local model store.
    model_id: String,

    /// Local model store directory.
    #[arg(long, default_value = "./models")]
    models_dir: PathBuf,
}

fn main() {
    let args = Args::parse();
    let store = ShardStore::new(args.models_dir.clone());

    let model_store = match store.open(&args.model_id) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("✗ Could not open model '{}': {e}", args.model_id);
            std::process::exit(1);
        }
    };

    let manifest = match model_store.load_manifest() {
        Ok(Some(m)) => m,
        Ok(None) => {
            eprintln!("✗ No manifest found for '{}'", args.model_id);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("✗ Failed to read manifest: {e}");
            std::process::exit(1);
        }
    };

    println!("Verifying {} shards for '{}'...", manifest.shards.len(), args.model_id);
    match model_store.verify_integrity(&manifest) {
        Ok(bad) if bad.is_empty() => {
            println!("✓ All shards verified");
        }
        Ok(bad) => {
            eprintln!("✗ {} shard(s) failed verification: {bad:?}", bad.len());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("✗ Verification error: {e}");
            std::process::exit(1);
        }
    }
}
