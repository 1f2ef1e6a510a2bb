use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[zbus::proxy(
    interface = "org.rollcall.Rollcall1",
    default_service = "org.rollcall.Rollcall1",
    default_path = "/org/rollcall/Rollcall1"
)]
trait Rollcall {
    async fn enroll(&self, identity: &str, image: &[u8]) -> zbus::Result<String>;
    async fn recognize(&self, image: &[u8], session: &str) -> zbus::Result<String>;
    async fn list_descriptors(&self, identity: &str) -> zbus::Result<String>;
    async fn list_attendance(&self) -> zbus::Result<String>;
    async fn remove_descriptor(&self, id: &str) -> zbus::Result<bool>;
    async fn clear_descriptors(&self) -> zbus::Result<u64>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall facial attendance CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll every face in an image under an identity
    Enroll {
        /// Registration number or user id
        identity: String,
        /// Image file
        image: PathBuf,
    },
    /// Recognize faces in an image and mark attendance
    Recognize {
        /// Image file
        image: PathBuf,
        /// Session key (e.g. an exam id) for per-session attendance
        #[arg(short, long)]
        session: Option<String>,
    },
    /// List enrolled descriptors
    List {
        /// Only show descriptors for this identity
        #[arg(short, long)]
        identity: Option<String>,
    },
    /// List attendance marks, newest first
    Attendance,
    /// Remove an enrolled descriptor
    Remove {
        /// Descriptor ID to remove
        id: String,
    },
    /// Remove every enrolled descriptor
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Show daemon status
    Status,
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Re-indent a JSON reply; non-JSON text is returned unchanged.
fn pretty(reply: &str) -> String {
    serde_json::from_str::<serde_json::Value>(reply)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| reply.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Clear { yes: false } = cli.command {
        bail!("refusing to delete all descriptors without --yes");
    }

    let builder = if cli.system {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    // detection can be slow; leave room above the daemon's own request timeout
    let conn = builder
        .method_timeout(Duration::from_secs(60))
        .build()
        .await
        .context("failed to connect to D-Bus")?;
    let proxy = RollcallProxy::new(&conn).await?;
    tracing::debug!(system = cli.system, "connected to rollcalld");

    match cli.command {
        Commands::Enroll { identity, image } => {
            let bytes = read_image(&image)?;
            let reply = proxy.enroll(&identity, &bytes).await?;
            println!("{}", pretty(&reply));
        }
        Commands::Recognize { image, session } => {
            let bytes = read_image(&image)?;
            let reply = proxy
                .recognize(&bytes, session.as_deref().unwrap_or_default())
                .await?;
            println!("{}", pretty(&reply));
        }
        Commands::List { identity } => {
            let reply = proxy
                .list_descriptors(identity.as_deref().unwrap_or_default())
                .await?;
            println!("{}", pretty(&reply));
        }
        Commands::Attendance => {
            println!("{}", pretty(&proxy.list_attendance().await?));
        }
        Commands::Remove { id } => {
            if proxy.remove_descriptor(&id).await? {
                println!("Removed descriptor {id}");
            } else {
                println!("Descriptor {id} not found");
            }
        }
        Commands::Clear { .. } => {
            let removed = proxy.clear_descriptors().await?;
            println!("Removed {removed} descriptor(s)");
        }
        Commands::Status => {
            println!("{}", pretty(&proxy.status().await?));
        }
    }

    Ok(())
}
