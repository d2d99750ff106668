//! Device capability probe, grounded in the teacher's `gpu-inference-test.rs`
//! bin: prints what the adapter supports before anyone tries to load a model
//! too big for it.

use doppler::device;

fn main() {
    println!("Probing for a compatible GPU adapter...");
    match device::probe() {
        Ok(handle) => {
            let caps = handle.capabilities;
            println!("✓ Adapter found");
            println!("  Tier: {:?}", caps.tier);
            println!("  Max model size: {:.1} GiB", caps.max_model_bytes() as f64 / (1024.0 * 1024.0 * 1024.0));
            println!("  Subgroups: {}", caps.has_subgroups);
            println!("  F16: {}", caps.has_f16);
            println!("  memory64: {}", caps.has_memory64);
            println!("  Unified memory: {}", caps.is_unified_memory);
        }
        Err(e) => {
            eprintln!("✗ No compatible adapter: {e}");
            std::process::exit(1);
        }
    }
}
