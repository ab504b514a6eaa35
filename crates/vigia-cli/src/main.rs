use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use vigia_hw::{ActuatorGateway, GatewayConfig};

#[zbus::proxy(
    interface = "org.vigia.Access1",
    default_service = "org.vigia.Access1",
    default_path = "/org/vigia/Access1"
)]
trait Access {
    async fn validate(&self, frame: &[u8], origin: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "vigia", about = "Vigía facial access control CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a captured image against the daemon
    Validate {
        /// Image file with the captured frame
        #[arg(short, long)]
        image: PathBuf,
        /// Device origin address to validate as
        #[arg(short, long)]
        origin: String,
    },
    /// Show daemon status
    Status,
    /// Send one command word to a door controller, bypassing the daemon
    Door {
        /// Physical door number
        door: u8,
        /// Command word: verde, rojo, parpadear, alerta
        word: String,
        /// Optional TOML controller layout (defaults to the built-in one)
        #[arg(short, long)]
        layout: Option<PathBuf>,
    },
    /// Run the canned controller exercise sequence
    Exercise {
        /// Optional TOML controller layout (defaults to the built-in one)
        #[arg(short, long)]
        layout: Option<PathBuf>,
    },
}

fn load_layout(path: Option<&PathBuf>) -> Result<GatewayConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading layout {}", path.display()))?;
            GatewayConfig::from_toml(&text).context("parsing layout")
        }
        None => Ok(GatewayConfig::default()),
    }
}

fn print_decision(json: &str) -> Result<()> {
    let decision: serde_json::Value = serde_json::from_str(json)?;

    println!("outcome: {}", decision["outcome"].as_str().unwrap_or("?"));
    if let Some(subject) = decision["subject"].as_object() {
        println!(
            "subject: {} (id {})",
            subject["display_name"].as_str().unwrap_or("?"),
            subject["id"]
        );
    }
    if let Some(zone) = decision["zone"].as_object() {
        println!("zone:    {} (code {})", zone["name"].as_str().unwrap_or("?"), zone["code"]);
    }
    if let Some(distance) = decision["distance"].as_f64() {
        println!("distance: {distance:.4}");
    }
    println!("attempts: {}", decision["attempts"]);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { image, origin } => {
            let frame = std::fs::read(&image)
                .with_context(|| format!("reading image {}", image.display()))?;

            let connection = zbus::Connection::session()
                .await
                .context("connecting to the session bus")?;
            let proxy = AccessProxy::new(&connection).await?;

            let json = proxy
                .validate(&frame, &origin)
                .await
                .context("validation call failed")?;
            print_decision(&json)?;
        }
        Commands::Status => {
            let connection = zbus::Connection::session()
                .await
                .context("connecting to the session bus")?;
            let proxy = AccessProxy::new(&connection).await?;

            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Door { door, word, layout } => {
            let gateway = ActuatorGateway::open(load_layout(layout.as_ref())?);
            gateway
                .send_word(door, &word)
                .with_context(|| format!("sending {word:?} to door {door}"))?;
            println!("sent {word}{door}");
        }
        Commands::Exercise { layout } => {
            let gateway = ActuatorGateway::open(load_layout(layout.as_ref())?);
            // One command per vocabulary word, spread across the partition,
            // with a pause so each effect is visible at the hardware.
            for (door, word) in [(4, "verde"), (5, "rojo"), (6, "parpadear")] {
                println!("sending {word}{door}");
                if let Err(e) = gateway.send_word(door, word) {
                    println!("  failed: {e}");
                }
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
            println!("exercise finished");
        }
    }

    Ok(())
}
