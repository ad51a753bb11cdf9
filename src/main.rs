use clap::Parser;
use perpwatch::cli::{self, output, Cli};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    // Another provider may already be installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    if let Err(e) = cli::run(cli).await {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
