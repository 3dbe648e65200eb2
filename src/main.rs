use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use guestbook::cli::{conversation, ping, report, track};
use guestbook::config::Config;
use guestbook::geo::GeoEnrichment;
use guestbook::sessions::{Conversations, SortOrder};
use guestbook::store::Store;
use guestbook::visits::VisitTracker;

#[derive(Parser)]
#[command(name = "guestbook")]
#[command(about = "Visitor tracking and conversation session analytics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "guestbook.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a visit from a client address
    Track {
        /// Client address (forwarding chains and ::ffff: forms accepted)
        address: String,

        /// User-Agent header
        #[arg(short, long)]
        user_agent: Option<String>,

        /// Origin header
        #[arg(short, long)]
        origin: Option<String>,
    },

    /// Show the country/region/city visit report
    Report,

    /// Conversation log
    Conversation {
        #[command(subcommand)]
        command: ConversationCommands,
    },

    /// Ping the configured health URL
    Ping {
        /// Ping once and exit instead of looping
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum ConversationCommands {
    /// Append a prompt/response turn
    Append {
        #[arg(short, long)]
        prompt: String,

        #[arg(short, long)]
        response: Option<String>,

        /// Session ID (anonymous session when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Origin the turn came from
        #[arg(short, long, default_value = "")]
        origin: String,
    },
    /// Show the turns of a session
    Show {
        /// Session ID (required)
        #[arg(short, long)]
        session: Option<String>,

        /// Newest first
        #[arg(long)]
        desc: bool,

        /// Maximum number of turns
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List sessions, most recent first
    List {
        /// Maximum number of sessions
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn open_store(config: &Config) -> Result<Arc<Store>> {
    let db_path = config.database_path();
    let store =
        Store::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Structured logging to stderr, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load config
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Track {
            address,
            user_agent,
            origin,
        } => {
            let geo = GeoEnrichment::from_config(&config.geo);
            let tracker = VisitTracker::new(open_store(&config)?, geo);
            track::run(&tracker, &address, user_agent.as_deref(), origin.as_deref()).await?;
        }
        Commands::Report => {
            let store = open_store(&config)?;
            report::run(&store)?;
        }
        Commands::Conversation { command } => {
            let conversations = Conversations::new(open_store(&config)?);
            match command {
                ConversationCommands::Append {
                    prompt,
                    response,
                    session,
                    origin,
                } => {
                    conversation::append(
                        &conversations,
                        &prompt,
                        response.as_deref(),
                        session.as_deref(),
                        &origin,
                    )?;
                }
                ConversationCommands::Show {
                    session,
                    desc,
                    limit,
                } => {
                    let order = if desc {
                        SortOrder::Descending
                    } else {
                        SortOrder::Ascending
                    };
                    conversation::show(&conversations, session.as_deref(), order, limit)?;
                }
                ConversationCommands::List { limit } => {
                    conversation::list(&conversations, limit)?;
                }
            }
        }
        Commands::Ping { once } => {
            ping::run(&config, once).await?;
        }
    }

    Ok(())
}
