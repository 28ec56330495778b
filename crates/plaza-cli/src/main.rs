//! `plaza` command line client: login, streamed chat, and the live
//! notification feed from a terminal. Logs go to stderr so streamed
//! content on stdout stays pipeable.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use plaza_chat::{ChatClient, ChatEvent};
use plaza_core::TokenPair;
use plaza_notify::{NotificationApi, NotificationCenter, NotifyEvent};
use plaza_transport::{ApiClient, FileTokenStore, TokenStore, TransportConfig};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plaza", about = "Plaza streaming client for the community platform")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "plaza.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store credentials, either directly or via a Kakao login code
    Login {
        /// Kakao OAuth authorization code to exchange
        #[arg(long)]
        kakao_code: Option<String>,
        /// Access token to store as-is
        #[arg(long)]
        access: Option<String>,
        /// Refresh token stored alongside the access token
        #[arg(long)]
        refresh: Option<String>,
    },
    /// End the session and drop stored credentials
    Logout,
    /// Ask a question and stream the answer to stdout
    Chat {
        /// The question to send
        question: String,
        /// Use the raw completion endpoint instead of the Q&A pipeline
        #[arg(long)]
        freeform: bool,
    },
    /// Notification feed
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
}

#[derive(Subcommand)]
enum NotifyAction {
    /// Follow the live stream and print items as they arrive
    Tail,
    /// Fetch and print the current list
    List {
        /// Page to fetch
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Page size
        #[arg(long, default_value_t = 20)]
        size: u32,
    },
    /// Mark one notification read
    Read {
        /// Notification id
        id: i64,
    },
    /// Delete notifications already read
    Purge,
}

#[derive(Deserialize)]
struct PlazaConfig {
    transport: TransportConfig,
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    // Load config
    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config: PlazaConfig = toml::from_str(&config_str)?;

    let store = Arc::new(FileTokenStore::new(config.data_dir.join("tokens.json")));
    let token_store: Arc<dyn TokenStore> = store.clone();
    let api = Arc::new(ApiClient::new(config.transport, token_store)?);

    match cli.command {
        Commands::Login {
            kakao_code,
            access,
            refresh,
        } => {
            if let Some(code) = kakao_code {
                api.login_with_kakao_code(&code).await?;
                println!("Logged in.");
            } else if let Some(access) = access {
                let pair = match refresh {
                    Some(refresh) => TokenPair::new(access, refresh),
                    None => TokenPair::access_only(access),
                };
                store.store(&pair).await?;
                println!("Credentials stored.");
            } else {
                anyhow::bail!("provide --kakao-code or --access");
            }
        }
        Commands::Logout => {
            api.logout().await;
            println!("Logged out.");
        }
        Commands::Chat { question, freeform } => {
            let chat = ChatClient::new(Arc::clone(&api));
            let mut stream = if freeform {
                chat.stream_completion(&json!({ "prompt": question })).await?
            } else {
                chat.stream_answer(&json!({ "question": question })).await?
            };

            let mut stdout = std::io::stdout();
            while let Some(event) = stream.next_event().await {
                match event {
                    ChatEvent::Delta { text } => {
                        write!(stdout, "{text}")?;
                        stdout.flush()?;
                    }
                    ChatEvent::Done { .. } => {
                        writeln!(stdout)?;
                    }
                    ChatEvent::Error { code, message } => match code {
                        Some(code) => anyhow::bail!("chat stream failed [{code}]: {message}"),
                        None => anyhow::bail!("chat stream failed: {message}"),
                    },
                }
            }
            stream.finish().await?;
        }
        Commands::Notify { action } => match action {
            NotifyAction::Tail => {
                let center = NotificationCenter::new(Arc::clone(&api));
                api.add_session_observer(Arc::new(center.clone())).await;
                let mut events = center.subscribe();
                center.connect().await;
                info!("following the notification stream, stop with Ctrl-C");
                loop {
                    match events.recv().await {
                        Ok(NotifyEvent::Delta(item)) => {
                            let marker = if item.is_read { ' ' } else { '*' };
                            println!(
                                "{marker} [{}] {}: {}",
                                item.notification_id, item.title, item.message
                            );
                        }
                        Ok(NotifyEvent::Resynced { total, unread }) => {
                            info!(total, unread, "notification list resynced");
                        }
                        Ok(NotifyEvent::Dropped(reason)) => {
                            warn!(%reason, "stream dropped, reconnecting");
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "feed events lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            NotifyAction::List { page, size } => {
                let center = NotificationCenter::new(Arc::clone(&api));
                center.sync_list(page, size).await?;
                let items = center.items().await;
                if items.is_empty() {
                    println!("No notifications.");
                }
                for item in &items {
                    let marker = if item.is_read { ' ' } else { '*' };
                    println!(
                        "{marker} [{}] {} {}: {}",
                        item.notification_id, item.created_at, item.title, item.message
                    );
                }
                let unread = NotificationApi::new(Arc::clone(&api))
                    .fetch_unread_count()
                    .await?;
                println!("{unread} unread on the server.");
            }
            NotifyAction::Read { id } => {
                NotificationApi::new(Arc::clone(&api))
                    .mark_notification_read(id)
                    .await?;
                println!("Marked notification {id} read.");
            }
            NotifyAction::Purge => {
                NotificationApi::new(Arc::clone(&api))
                    .delete_read_notifications()
                    .await?;
                println!("Read notifications deleted.");
            }
        },
    }

    Ok(())
}
