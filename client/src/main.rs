use clap::Parser;
use client::network::{ClientError, GameClient};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Server port
    #[arg(short, long, default_value = "11000")]
    port: u16,

    /// Player name sent in the join request
    #[arg(short, long, default_value = "Observer")]
    name: String,

    /// Frames between scoreboard reports
    #[arg(long, default_value = "300")]
    report_every: u64,
}

/// Headless client: joins the arena, mirrors the server's frames, and
/// periodically logs the standings.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Connecting to {}:{}", args.server, args.port);

    let mut client = GameClient::connect(&args.server, args.port, &args.name).await?;

    let mut polls: u64 = 0;
    loop {
        match client.poll().await {
            Ok(()) => {}
            Err(ClientError::Disconnected(message)) => {
                info!("Disconnected: {}", message);
                break;
            }
            Err(err) => {
                error!("Protocol failure: {}", err);
                client.close();
                break;
            }
        }

        for beam in client.world.take_beams() {
            info!("Beam fired by tank {}", beam.owner);
        }

        polls += 1;
        if client.is_joined() && polls % args.report_every == 0 {
            for (name, score) in client.world.scoreboard() {
                info!("{:<16} {}", name, score);
            }
        }
    }

    Ok(())
}
