use clap::{Parser, Subcommand};
use doppler::cli;

#[derive(Parser)]
#[command(name = "doppler", about = "Browser-native GPU-accelerated LLM inference engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP inference server.
    Serve(cli::ServeArgs),
}

#[tokio::main]
async fn main() {
    doppler::logging::init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => cli::serve_command(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
