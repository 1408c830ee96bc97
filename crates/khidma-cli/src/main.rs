//! Khidma CLI - marketplace messaging from the terminal

use clap::{Parser, Subcommand};
use khidma_core::auth::Session;
use khidma_core::cache::QueryCache;
use khidma_core::catalog::{Service, ServiceRepository, User, UserRepository};
use khidma_core::chat::{ChatService, ConversationStatus};
use khidma_core::config::Config;
use khidma_core::notify::{ChannelToastSink, NotificationDispatcher, ReminderScheduler, TracingMailer};
use khidma_core::realtime::{ChangeFeed, FeedAdapter};
use khidma_core::storage::Database;
use khidma_core::unread::{InvalidationSignal, UnreadCounter};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "khidma")]
#[command(author, version, about = "Services marketplace messaging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Database management
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Seed demo users and services
    Seed,

    /// Open (or fetch) a conversation about a service
    Open {
        /// User id to act as
        #[arg(long = "as")]
        as_user: String,
        /// Service id the conversation is about
        service: String,
        /// Provider user id
        provider: String,
    },

    /// Send a message in a conversation
    Send {
        /// User id to act as
        #[arg(long = "as")]
        as_user: String,
        /// Conversation id
        conversation: String,
        /// Message text
        content: String,
    },

    /// List conversation summaries
    Conversations {
        /// User id to act as
        #[arg(long = "as")]
        as_user: String,
    },

    /// List messages of a conversation
    Messages {
        /// User id to act as
        #[arg(long = "as")]
        as_user: String,
        /// Conversation id
        conversation: String,
        /// Mark received messages as read while listing
        #[arg(long)]
        mark_read: bool,
    },

    /// Change a conversation's status
    SetStatus {
        /// User id to act as
        #[arg(long = "as")]
        as_user: String,
        /// Conversation id
        conversation: String,
        /// New status (active, archived, closed)
        status: String,
    },

    /// Show the unread message count
    Unread {
        /// User id to act as
        #[arg(long = "as")]
        as_user: String,
    },

    /// Run one email-reminder pass over stale unread messages
    Remind,

    /// Watch for changes: live unread count and incoming toasts
    Watch {
        /// User id to act as
        #[arg(long = "as")]
        as_user: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Create the database and run migrations
    Init,
    /// Show migration status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("khidma=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Db { action } => cmd_db(action, cli.quiet).await,

        Commands::Seed => {
            let db = Database::default().await?;
            cmd_seed(&db, cli.quiet).await
        }

        Commands::Open {
            as_user,
            service,
            provider,
        } => {
            let (chat, session) = open_chat(&as_user).await?;
            cmd_open(&chat, &session, &service, &provider, cli.format, cli.quiet).await
        }

        Commands::Send {
            as_user,
            conversation,
            content,
        } => {
            let (chat, session) = open_chat(&as_user).await?;
            cmd_send(&chat, &session, &conversation, &content, cli.format, cli.quiet).await
        }

        Commands::Conversations { as_user } => {
            let (chat, session) = open_chat(&as_user).await?;
            cmd_conversations(&chat, &session, cli.format).await
        }

        Commands::Messages {
            as_user,
            conversation,
            mark_read,
        } => {
            let (chat, session) = open_chat(&as_user).await?;
            cmd_messages(&chat, &session, &conversation, mark_read, cli.format).await
        }

        Commands::SetStatus {
            as_user,
            conversation,
            status,
        } => {
            let (chat, session) = open_chat(&as_user).await?;
            cmd_set_status(&chat, &session, &conversation, &status, cli.quiet).await
        }

        Commands::Unread { as_user } => {
            let (chat, session) = open_chat(&as_user).await?;
            let count = chat.unread_count(&session).await?;
            println!("{}", count);
            Ok(())
        }

        Commands::Remind => cmd_remind(cli.quiet).await,

        Commands::Watch { as_user } => cmd_watch(&as_user).await,

        Commands::Config { action } => cmd_config(action),
    }
}

/// Load the database, resolve the acting user, and build the facade
async fn open_chat(user_id: &str) -> anyhow::Result<(ChatService, Session)> {
    let config = Config::load()?;
    let db = Database::default().await?;

    let user = UserRepository::new(&db)
        .get(user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown user: {}", user_id))?;
    let session = Session::new(&user.id, &user.display_name);

    let chat = ChatService::new(
        db,
        Arc::new(QueryCache::new()),
        ChangeFeed::new(config.chat.feed_capacity),
    );
    Ok((chat, session))
}

async fn cmd_db(action: DbAction, quiet: bool) -> anyhow::Result<()> {
    let db = Database::default().await?;
    match action {
        DbAction::Init => {
            db.migrate().await?;
            if !quiet {
                println!("Database ready at {}", db.path().display());
            }
        }
        DbAction::Status => {
            let status = db.migration_status().await?;
            println!(
                "schema version {} of {}{}",
                status.current_version,
                status.target_version,
                if status.needs_migration {
                    " (migration needed)"
                } else {
                    ""
                }
            );
        }
    }
    Ok(())
}

async fn cmd_seed(db: &Database, quiet: bool) -> anyhow::Result<()> {
    let users = UserRepository::new(db);
    let services = ServiceRepository::new(db);

    let client = User::new("أحمد");
    let provider = User::new("فاطمة");
    users.create(&client).await?;
    users.create(&provider).await?;

    let service = Service::new(&provider.id, "تصميم شعار");
    services.create(&service).await?;

    if !quiet {
        println!("Seeded demo data:");
        println!("  client:   {} ({})", client.id, client.display_name);
        println!("  provider: {} ({})", provider.id, provider.display_name);
        println!("  service:  {} ({})", service.id, service.title);
        println!("\nNext steps:");
        println!("  khidma open --as {} {} {}", client.id, service.id, provider.id);
    }
    Ok(())
}

async fn cmd_open(
    chat: &ChatService,
    session: &Session,
    service_id: &str,
    provider_id: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let conversation = chat.open_conversation(session, service_id, provider_id).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&conversation)?),
        OutputFormat::Text => {
            if !quiet {
                println!("Conversation {}", conversation.id);
                println!("  status: {}", conversation.status.as_str());
            } else {
                println!("{}", conversation.id);
            }
        }
    }
    Ok(())
}

async fn cmd_send(
    chat: &ChatService,
    session: &Session,
    conversation_id: &str,
    content: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let message = chat.send_message(session, conversation_id, content).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&message)?),
        OutputFormat::Text => {
            if !quiet {
                println!("Sent {} at {}", message.id, message.created_at.to_rfc3339());
            }
        }
    }
    Ok(())
}

async fn cmd_conversations(
    chat: &ChatService,
    session: &Session,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let summaries = chat.list_conversations(session).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Text => {
            if summaries.is_empty() {
                println!("No conversations.");
                return Ok(());
            }
            for s in summaries {
                let unread = if s.unread_count > 0 {
                    format!(" [{} unread]", s.unread_count)
                } else {
                    String::new()
                };
                println!(
                    "{}  {} / {}{}",
                    s.conversation.id, s.counterpart_name, s.service_title, unread
                );
                if let Some(last) = s.last_message {
                    println!("    {}", last);
                }
            }
        }
    }
    Ok(())
}

async fn cmd_messages(
    chat: &ChatService,
    session: &Session,
    conversation_id: &str,
    mark_read: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let messages = chat.list_messages(session, conversation_id).await?;

    if mark_read {
        for message in messages.iter().filter(|m| m.sender_id != session.user_id) {
            chat.mark_read_best_effort(session, &message.id).await;
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&messages)?),
        OutputFormat::Text => {
            for m in messages {
                let marker = if m.sender_id == session.user_id { ">" } else { "<" };
                println!("{} [{}] {}", marker, m.created_at.format("%H:%M"), m.content);
            }
        }
    }
    Ok(())
}

async fn cmd_set_status(
    chat: &ChatService,
    session: &Session,
    conversation_id: &str,
    status: &str,
    quiet: bool,
) -> anyhow::Result<()> {
    let status = ConversationStatus::parse(status)
        .ok_or_else(|| anyhow::anyhow!("invalid status: {} (expected active, archived, or closed)", status))?;

    chat.set_status(session, conversation_id, status).await?;
    if !quiet {
        println!("Conversation {} is now {}", conversation_id, status.as_str());
    }
    Ok(())
}

async fn cmd_remind(quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = Database::default().await?;

    let scheduler = ReminderScheduler::new(
        db,
        TracingMailer,
        config.notifications.reminder_threshold_mins,
    );
    let sent = scheduler.run_once().await?;
    if !quiet {
        println!("Sent {} reminder(s).", sent);
    }
    Ok(())
}

/// Live view: unread count updates and incoming message toasts
async fn cmd_watch(user_id: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let db = Database::default().await?;

    let user = UserRepository::new(&db)
        .get(user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown user: {}", user_id))?;
    let session = Session::new(&user.id, &user.display_name);

    let cache = Arc::new(QueryCache::new());
    let feed = ChangeFeed::new(config.chat.feed_capacity);
    let signal = Arc::new(InvalidationSignal::new());

    let (sink, mut toasts) = ChannelToastSink::new(64);
    let dispatcher = Arc::new(NotificationDispatcher::new(
        db.clone(),
        sink,
        config.notifications.toast_preview_chars,
    ));

    let _adapter = FeedAdapter::spawn(
        &feed,
        session.clone(),
        db.clone(),
        cache.clone(),
        signal.clone(),
        dispatcher,
    );

    let counter = UnreadCounter::new(db, &session.user_id, cache);
    let mut watcher = counter.spawn(
        signal,
        Duration::from_secs(config.chat.unread_poll_secs),
        Duration::from_millis(config.chat.invalidation_debounce_ms),
    );

    tracing::info!(user_id = %session.user_id, "watch started");
    println!("Watching as {} (ctrl-c to stop)", session.display_name);
    loop {
        tokio::select! {
            Some(count) = watcher.changed() => {
                println!("unread: {}", count);
            }
            Some(toast) = toasts.recv() => {
                println!("{} ({}): {}", toast.counterpart_name, toast.service_title, toast.preview);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("{} = {}", key, value);
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}
