use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::*;
use tokio::sync::watch;

use chatbot_tui::api::{ApiClient, ChatBackend};
use chatbot_tui::app::App;
use chatbot_tui::config::Config;
use chatbot_tui::controller::{self, ChatController, ChatView, Intent, NoticeLevel};
use chatbot_tui::handler::handle_event;
use chatbot_tui::mock::MockBackend;
use chatbot_tui::model::{ContentType, Role};
use chatbot_tui::tui::{self, EventHandler, Tui};
use chatbot_tui::{logging, ui};

#[derive(Parser)]
#[command(name = "chatbot")]
#[command(version, about = "Terminal client for an AI chat service with text and image conversations")]
struct Cli {
    /// Chat service base URL (the /api suffix is added automatically)
    #[arg(long, global = true)]
    backend_url: Option<String>,
    /// Use the built-in offline backend instead of a server
    #[arg(long, global = true)]
    mock: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat interface (default)
    Tui,
    /// List conversations, most recent first
    Sessions,
    /// Start a new conversation
    New {
        /// Conversation title
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Delete a conversation
    Delete {
        /// Conversation id
        id: String,
    },
    /// Print the messages of a conversation
    Messages {
        /// Conversation id
        session_id: String,
    },
    /// Send a message and print the reply
    Send {
        /// Conversation id (defaults to the most recent one)
        #[arg(short, long)]
        session: Option<String>,
        /// Ask for an image instead of a text reply
        #[arg(long)]
        image: bool,
        /// Message text or image prompt
        content: String,
    },
    /// Save a message to the download directory
    Download {
        /// Conversation id
        session_id: String,
        /// Message id
        message_id: String,
    },
    /// Check that the chat service is reachable
    Status,
    /// Write the config file, keeping --backend-url and --mock if given
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let use_mock = cli.mock || config.use_mock;
    let (backend, target): (Arc<dyn ChatBackend>, String) = if use_mock {
        (
            Arc::new(MockBackend::seeded(&config.default_session_title)),
            "offline mock".to_string(),
        )
    } else {
        let client = ApiClient::new(&config.api_base(cli.backend_url.as_deref()));
        let target = client.api_base().to_string();
        (Arc::new(client), target)
    };

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => run_tui(backend, &target, &config).await,
        Commands::Init => {
            let mut saved = config.clone();
            if let Some(url) = cli.backend_url {
                saved.backend_url = Some(url);
            }
            saved.use_mock = use_mock;
            saved.save()?;
            println!("{} {}", "Saved".green(), Config::config_path()?.display());
            Ok(())
        }
        command => {
            logging::init_stderr()?;
            // `new --title` only changes what the create call sends
            let title = match &command {
                Commands::New { title: Some(title) } => title.clone(),
                _ => config.default_session_title.clone(),
            };
            let mut controller = ChatController::new(backend.clone(), &title, config.download_dir());
            match command {
                Commands::Status => show_status(backend.as_ref(), &target).await,
                other => run_command(&mut controller, other).await,
            }
        }
    }
}

async fn run_tui(backend: Arc<dyn ChatBackend>, target: &str, config: &Config) -> Result<()> {
    let log_dir = Config::config_dir()?.join("logs");
    let _guard = logging::init_file(&log_dir)?;
    tracing::info!(
        backend = target,
        download_dir = %config.download_dir().display(),
        "starting chat interface"
    );

    let controller = ChatController::new(
        backend,
        &config.default_session_title,
        config.download_dir(),
    );
    let mut handle = controller::spawn(controller);

    let mut app = App::new(handle.intents.clone());
    app.dispatch(Intent::Load)?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run_loop(&mut terminal, &mut app, &mut events, &mut handle.view).await;

    tui::restore()?;
    if let Err(e) = &result {
        tracing::error!(error = %e, "chat interface stopped with an error");
    }
    result
}

async fn run_loop(
    terminal: &mut Tui,
    app: &mut App,
    events: &mut EventHandler,
    views: &mut watch::Receiver<ChatView>,
) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handle_event(app, event)?,
            changed = views.changed() => {
                if changed.is_err() {
                    bail!("chat controller stopped");
                }
                let view = views.borrow_and_update().clone();
                app.apply_view(view);
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

async fn run_command(controller: &mut ChatController, command: Commands) -> Result<()> {
    controller.load().await;

    match command {
        Commands::Sessions => {
            let view = controller.view();
            if view.sessions.is_empty() && !has_error(view) {
                println!("{}", "No conversations yet".dimmed());
            }
            for session in &view.sessions {
                println!(
                    "{}  {}  {}",
                    session.id.dimmed(),
                    session.title.bold(),
                    session.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string().dimmed()
                );
            }
        }
        Commands::New { .. } => {
            if controller.new_session().await {
                print_session_line(controller.view());
            }
        }
        Commands::Delete { id } => {
            if !controller.view().sessions.iter().any(|s| s.id == id) {
                report(controller.view())?;
                bail!("no conversation with id {}", id);
            }
            controller.delete_session(&id).await;
        }
        Commands::Messages { session_id } => {
            select_or_fail(controller, &session_id).await?;
            print_messages(controller.view());
        }
        Commands::Send { session, image, content } => {
            if let Some(session_id) = session {
                select_or_fail(controller, &session_id).await?;
            }
            let before = controller.view().messages.len();
            let content_type = if image { ContentType::Image } else { ContentType::Text };
            if controller.send_message(&content, content_type).await {
                let view = controller.view();
                let fresh = ChatView {
                    messages: view.messages.iter().skip(before).cloned().collect(),
                    ..ChatView::default()
                };
                print_messages(&fresh);
            }
        }
        Commands::Download { session_id, message_id } => {
            select_or_fail(controller, &session_id).await?;
            controller.download(&message_id).await;
        }
        Commands::Tui | Commands::Status | Commands::Init => {}
    }

    report(controller.view())
}

async fn select_or_fail(controller: &mut ChatController, session_id: &str) -> Result<()> {
    if !controller.view().sessions.iter().any(|s| s.id == session_id) {
        report(controller.view())?;
        bail!("no conversation with id {}", session_id);
    }
    controller.select_session(session_id).await;
    Ok(())
}

async fn show_status(backend: &dyn ChatBackend, target: &str) -> Result<()> {
    println!("{} {}", "Backend:".bold(), target.cyan());
    match backend.ping().await {
        Ok(banner) => {
            println!("{} {}", "✓".green(), banner);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            bail!("chat service is not reachable")
        }
    }
}

fn print_session_line(view: &ChatView) {
    if let Some(session) = view.active_session() {
        println!("{}  {}", session.id.dimmed(), session.title.bold());
    }
}

fn print_messages(view: &ChatView) {
    if view.messages.is_empty() {
        println!("{}", "No messages yet".dimmed());
    }
    for message in &view.messages {
        let label = match message.role {
            Role::User => "You".bold().cyan(),
            Role::Assistant => "AI Assistant".bold().yellow(),
        };
        let time = message.timestamp.with_timezone(&Local).format("%H:%M").to_string();
        println!("{}  {}  {}", label, time.dimmed(), message.id.dimmed());
        match message.content_type {
            ContentType::Text => println!("{}\n", message.content),
            ContentType::Image => {
                if let Some(prompt) = &message.prompt {
                    println!("{}", format!("\"{}\"", prompt).italic());
                }
                println!("[image] {}\n", message.image_summary());
            }
        }
    }
}

fn has_error(view: &ChatView) -> bool {
    view.notifications.iter().any(|n| n.level == NoticeLevel::Error)
}

/// Print notifications; any error turns into a failing exit status
fn report(view: &ChatView) -> Result<()> {
    for notification in &view.notifications {
        match notification.level {
            NoticeLevel::Info => println!(
                "{} {}: {}",
                "✓".green(),
                notification.title.bold(),
                notification.description
            ),
            NoticeLevel::Error => eprintln!(
                "{} {}: {}",
                "✗".red(),
                notification.title.bold().red(),
                notification.description
            ),
        }
    }
    if has_error(view) {
        bail!("command failed");
    }
    Ok(())
}
