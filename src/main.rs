use clap::Parser;
use tabulon::{config, run};

#[derive(Parser)]
#[command(name = "tabulon", about = "Tabulon: a versioned, multi-tenant spreadsheet-config store")]
struct Cli {}

#[tokio::main]
async fn main() {
	let _cli = Cli::parse();

	match config::load() {
		Ok(settings) => println!("Loaded settings: host={} port={}", settings.host, settings.port),
		Err(e) => eprintln!("Warning: failed to load config: {}", e),
	}

	run().await;
}
