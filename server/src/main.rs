use clap::Parser;
use server::controller::ServerController;
use shared::GameConfig;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, loads the optional settings file, then
/// binds the listener and runs the game loop until the process is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "11000")]
        port: u16,
        /// Path to a JSON settings file (defaults apply for missing keys)
        #[clap(short, long)]
        settings: Option<String>,
    }

    let args = Args::parse();

    let config = match &args.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str::<GameConfig>(&text)?
        }
        None => GameConfig::default(),
    };

    let address = format!("{}:{}", args.host, args.port);
    let controller = ServerController::bind(&address, Arc::new(config)).await?;

    tokio::select! {
        _ = controller.run() => {
            eprintln!("Server loop ended unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
