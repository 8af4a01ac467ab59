//! CLI binary for the interview copilot.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand, ValueEnum};
use copilot::capture::SpeechCapture;
use copilot::capture::capability::{OperatingMode, probe, select_mode};
use copilot::controller::client::HttpAnswerClient;
use copilot::controller::{
    AnswerController, ControllerEvent, PROCESSING_PLACEHOLDER, SubmitOutcome,
};
use copilot::history::{DEFAULT_LIST_LIMIT, HistoryAdapter, HttpHistoryStore, SaveStatus};
use copilot::preferences::Preferences;
use copilot::remote::{
    CaptureDriver, CommandAction, HttpSessionChannel, RemoteController, SessionChannel,
    run_primary,
};
use copilot::{AppServer, CopilotConfig, ServerServices};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Live interview copilot.
#[derive(Parser)]
#[command(name = "copilot", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server (answer endpoint, history, session mailboxes).
    Serve,

    /// Capture one answer (or use --transcript) and print the suggestion.
    Ask {
        /// Skip capture and send this transcript.
        #[arg(short, long)]
        transcript: Option<String>,
    },

    /// Act as the primary device: capture when a remote command says so.
    Listen,

    /// Act as the remote device: send a command to the primary.
    Remote {
        action: RemoteAction,
        /// Wait for the resulting answer.
        #[arg(short, long)]
        wait: bool,
    },

    /// List recent exchanges.
    History {
        #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Manage the saved job context.
    Context {
        #[command(subcommand)]
        command: ContextCommand,
    },

    /// Show detected capabilities and the operating mode they select.
    Probe,
}

#[derive(Clone, Copy, ValueEnum)]
enum RemoteAction {
    Start,
    Stop,
}

impl From<RemoteAction> for CommandAction {
    fn from(action: RemoteAction) -> Self {
        match action {
            RemoteAction::Start => Self::Start,
            RemoteAction::Stop => Self::Stop,
        }
    }
}

#[derive(Subcommand)]
enum ContextCommand {
    /// Print the current job context.
    Show,
    /// Save a new job context.
    Set { text: String },
    /// Restore the default job context.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CopilotConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let _log_guard = copilot::logging::init(&config.logging);

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Ask { transcript } => ask(config, transcript).await,
        Command::Listen => listen(config).await,
        Command::Remote { action, wait } => remote(config, action.into(), wait).await,
        Command::History { limit } => history(config, limit).await,
        Command::Context { command } => context(command),
        Command::Probe => probe_host(&config),
    }
}

async fn serve(config: CopilotConfig) -> anyhow::Result<()> {
    let services = ServerServices::from_config(&config)?;
    if services.credential.resolve().is_none() {
        tracing::warn!(
            var = services.credential.name(),
            "upstream credential not set; answer requests will fail until it is"
        );
    }
    let server = AppServer::start(services, &config.server).await?;
    println!("Listening on {}", server.url());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), server.wait()).await;
    Ok(())
}

fn build_controller(
    config: &CopilotConfig,
) -> (AnswerController, mpsc::UnboundedReceiver<ControllerEvent>) {
    let server_url = config.client.server_url.as_str();
    let client = Arc::new(HttpAnswerClient::new(server_url));
    let history = HistoryAdapter::new(Arc::new(HttpHistoryStore::new(server_url)));
    AnswerController::new(client, Some(history))
}

async fn ask(config: CopilotConfig, transcript: Option<String>) -> anyhow::Result<()> {
    let prefs = Preferences::load_default()?;
    let (controller, mut events) = build_controller(&config);

    let transcript = match transcript {
        Some(t) => t,
        None => {
            let capture = SpeechCapture::from_config(&config.capture);
            let (tx, rx) = oneshot::channel();
            capture
                .start(move |text| {
                    let _ = tx.send(text);
                })
                .await?;
            eprintln!("Listening... (blank line to finish)");
            rx.await.unwrap_or_default()
        }
    };

    let handle = match controller.submit(prefs.job_context(), &transcript) {
        SubmitOutcome::Started(handle) => handle,
        SubmitOutcome::Rejected(message) => bail!(message),
    };

    let mut renderer = Renderer::default();
    while let Some(event) = events.recv().await {
        if renderer.render(&event) {
            break;
        }
    }
    handle.finished().await;
    Ok(())
}

async fn listen(config: CopilotConfig) -> anyhow::Result<()> {
    let capture = SpeechCapture::from_config(&config.capture);
    let capabilities = probe(config.capture.backend, capture.recognizer());
    if select_mode(&capabilities) == OperatingMode::RemoteControlled {
        bail!("no speech recognizer on this device; use `copilot remote` to control another one");
    }

    let prefs = Preferences::load_default()?;
    let (controller, events) = build_controller(&config);
    let channel: Arc<dyn SessionChannel> = Arc::new(HttpSessionChannel::new(
        config.client.server_url.clone(),
        config.remote.session_id.clone(),
    ));
    let driver = CaptureDriver::new(capture, controller, prefs.job_context());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        on_signal.cancel();
    });

    eprintln!(
        "Session {}: waiting for remote start/stop commands",
        config.remote.session_id
    );
    let mut renderer = Renderer::default();
    run_primary(
        channel,
        driver,
        events,
        move |event| {
            renderer.render(event);
        },
        cancel,
    )
    .await?;
    Ok(())
}

async fn remote(config: CopilotConfig, action: CommandAction, wait: bool) -> anyhow::Result<()> {
    let channel = Arc::new(HttpSessionChannel::new(
        config.client.server_url.clone(),
        config.remote.session_id.clone(),
    ));
    let controller = RemoteController::new(channel, config.remote.device_label.clone());
    let previous = if wait {
        controller.current_answer().await?
    } else {
        None
    };
    let (_, status) = controller.send(action).await?;
    println!("Current status: {status}");

    if wait {
        eprintln!("Waiting for answer...");
        let answer = controller.wait_for_answer(previous).await?;
        println!("Transcript: {}", answer.transcript);
        println!("{}", answer.answer);
    }
    Ok(())
}

async fn history(config: CopilotConfig, limit: usize) -> anyhow::Result<()> {
    let store = HttpHistoryStore::new(config.client.server_url.as_str());
    let listing = HistoryAdapter::new(Arc::new(store)).list(limit).await;
    if let Some(issue) = &listing.issue {
        eprintln!("{}", issue.message());
    }
    if listing.exchanges.is_empty() && listing.issue.is_none() {
        println!("No exchanges yet.");
    }
    for exchange in &listing.exchanges {
        println!("── {}", exchange.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("Q: {}", exchange.transcript);
        println!("A: {}", exchange.answer);
    }
    Ok(())
}

fn context(command: ContextCommand) -> anyhow::Result<()> {
    let mut prefs = Preferences::load_default()?;
    match command {
        ContextCommand::Show => println!("{}", prefs.job_context()),
        ContextCommand::Set { text } => {
            prefs.set_job_context(&text)?;
            println!("✅ Job context saved!");
        }
        ContextCommand::Reset => {
            prefs.reset_job_context()?;
            println!("{}", prefs.job_context());
        }
    }
    Ok(())
}

fn probe_host(config: &CopilotConfig) -> anyhow::Result<()> {
    let capture = SpeechCapture::from_config(&config.capture);
    let capabilities = probe(config.capture.backend, capture.recognizer());
    println!("{}", serde_json::to_string_pretty(&capabilities)?);
    println!("Operating mode: {}", select_mode(&capabilities));
    Ok(())
}

/// Prints controller events to the terminal, streaming answer deltas.
#[derive(Default)]
struct Renderer {
    shown: String,
}

impl Renderer {
    /// Returns `true` once the request is fully settled.
    fn render(&mut self, event: &ControllerEvent) -> bool {
        match event {
            ControllerEvent::Display { text, .. } if text == PROCESSING_PLACEHOLDER => {
                eprintln!("{PROCESSING_PLACEHOLDER}");
                self.shown.clear();
            }
            ControllerEvent::Display { text, .. } => {
                let delta = text.strip_prefix(self.shown.as_str()).unwrap_or(text);
                print!("{delta}");
                let _ = std::io::stdout().flush();
                self.shown = text.clone();
            }
            ControllerEvent::Completed { .. } => println!(),
            ControllerEvent::Failed { .. } => {
                println!();
                return true;
            }
            ControllerEvent::Rejected { message } => {
                eprintln!("{message}");
                return true;
            }
            ControllerEvent::SaveStatus { status, .. } => {
                eprintln!("{}", status.label());
                if *status != SaveStatus::Saving {
                    return true;
                }
            }
        }
        false
    }
}
