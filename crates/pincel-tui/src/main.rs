use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use pincel_core::conversation::save_image;
use pincel_core::{
    ChatRole, Config, Conversation, GeminiClient, GenerationProvider, ImageData, MessageRouter,
    SessionStore,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;

/// Drives the loading animation and polling of the in-flight request
const TICK_RATE: Duration = Duration::from_millis(300);

#[derive(Parser)]
#[command(name = "pincel")]
#[command(about = "Chat with Gemini to generate and edit images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message to the most recent chat and print the reply
    Send {
        /// What to say or what to draw
        prompt: String,
        /// Image to edit (png, jpeg or webp)
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// List saved chats
    Sessions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|err| {
        eprintln!("{}: {}", "Could not read config, using defaults".yellow(), err);
        Config::new()
    });

    init_logging(&config, cli.command.is_none())?;

    let router = MessageRouter::new().with_conversational_edit(config.conversational_edit());
    let store = SessionStore::open(&config)?;
    tracing::info!(
        path = %store.path().display(),
        classifier = router.classifier_name(),
        "opening history"
    );
    let conversation = Conversation::open(store, router);

    let provider: Option<Arc<dyn GenerationProvider>> = match GeminiClient::from_config(&config) {
        Ok(client) => Some(Arc::new(client)),
        Err(err) => {
            tracing::warn!("no provider: {}", err);
            None
        }
    };

    match cli.command {
        None => run_tui(config, conversation, provider).await,
        Some(Commands::Send { prompt, image }) => {
            send_once(&config, conversation, provider, &prompt, image).await
        }
        Some(Commands::Sessions) => {
            list_sessions(&conversation);
            Ok(())
        }
    }
}

/// The TUI owns the terminal, so its logs go to a file under the data dir
fn init_logging(config: &Config, to_file: bool) -> Result<()> {
    let default_level = if to_file { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("PINCEL_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    if to_file {
        let log_dir = config.data_dir()?;
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create {}", log_dir.display()))?;
        let log_file = std::fs::File::create(log_dir.join("pincel.log"))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

async fn run_tui(
    config: Config,
    conversation: Conversation,
    provider: Option<Arc<dyn GenerationProvider>>,
) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new(TICK_RATE);
    let mut app = App::new(config, conversation, provider);
    app.scroll_chat_to_bottom();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

async fn send_once(
    config: &Config,
    mut conversation: Conversation,
    provider: Option<Arc<dyn GenerationProvider>>,
    prompt: &str,
    image: Option<PathBuf>,
) -> Result<()> {
    let Some(provider) = provider else {
        bail!("API key not configured. Set GEMINI_API_KEY or run `pincel` and press 'K'.");
    };

    let image = image.as_deref().map(ImageData::from_path).transpose()?;

    println!("{} {}", "You:".bold().cyan(), prompt);
    if let Err(err) = conversation.send(provider.as_ref(), prompt, image).await {
        bail!("{}", err);
    }

    let Some(reply) = conversation
        .active_session()
        .messages
        .last()
        .filter(|m| m.role == ChatRole::Model)
    else {
        bail!("No reply was recorded");
    };

    println!("{}", "AI:".bold().yellow());
    for part in &reply.parts {
        if let Some(url) = &part.image_url {
            match conversation.resolve_image(url) {
                Some(image) => {
                    let path = save_image(&image, &config.download_dir())?;
                    println!("  {} {}", "image saved to".green(), path.display());
                }
                None => println!("  {}", "image unavailable".dimmed()),
            }
        }
        if let Some(text) = part.non_blank_text() {
            println!("{}", text);
        }
    }

    if let Some(err) = conversation.error() {
        bail!("{}", err);
    }
    Ok(())
}

fn list_sessions(conversation: &Conversation) {
    let sessions = conversation.sessions();
    println!("\n{}", "Saved chats".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    for session in sessions {
        let images = session
            .messages
            .iter()
            .flat_map(|m| m.parts.iter())
            .filter(|p| p.image_url.is_some())
            .count();
        println!(
            "  • {} {}",
            session.title(),
            format!("({} messages, {} images)", session.messages.len(), images).dimmed()
        );
    }
}
