mod config;
mod error;

use std::path::Path;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use gateway::{ChatMessage, ProviderRouter};

use config::Config;
use error::Result;

const CONFIG_FILE: &str = "sensei.toml";
const SYSTEM_PROMPT: &str = "You are an expert Python sensei.";

#[derive(Parser)]
#[command(name = "sensei")]
#[command(about = "AI gateway for the Python tutor", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the free-trial backend endpoint
    Serve {
        /// Listen address, e.g. 127.0.0.1:8787
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// Send one prompt through the configured provider
    Chat {
        /// The user prompt
        prompt: String,
        /// Override the system prompt
        #[arg(short, long)]
        system: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr } => cmd_serve(addr).await,
        Commands::Chat { prompt, system } => cmd_chat(&prompt, system.as_deref()).await,
    }
}

fn load_config() -> Result<Config> {
    if Path::new(CONFIG_FILE).exists() {
        Ok(Config::load(CONFIG_FILE)?)
    } else {
        Ok(Config::default())
    }
}

async fn cmd_serve(addr: Option<String>) -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;
    let mut server_config = config.server_config();
    if let Some(addr) = addr {
        server_config.addr = addr;
    }

    println!("sensei v{}", env!("CARGO_PKG_VERSION"));
    println!("Trial endpoint on http://{}/api/ai", server_config.addr);

    server::serve(server_config).await?;
    Ok(())
}

async fn cmd_chat(prompt: &str, system: Option<&str>) -> Result<()> {
    let config = load_config()?;

    let mut router = ProviderRouter::with_options(config.router_options());
    router.configure(config.provider_config()?);

    let messages = [
        ChatMessage::system(system.unwrap_or(SYSTEM_PROMPT)),
        ChatMessage::user(prompt),
    ];
    let reply = router.chat(&messages).await?;
    println!("{reply}");

    // Display estimate only; the server decides admission.
    if let Some(status) = router.quota_status() {
        print!("\nFree trial: {} requests left", status.remaining);
        match Local.timestamp_millis_opt(status.reset_at as i64).single() {
            Some(reset) if status.reset_at > 0 => {
                println!(" (resets {})", reset.format("%Y-%m-%d %H:%M"));
            }
            _ => println!(),
        }
    }

    Ok(())
}
