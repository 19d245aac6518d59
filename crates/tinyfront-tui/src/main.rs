//! tinyfront - a terminal front end for an Entra ID protected API.
//!
//! Signs the user in with the authorization code flow (the login page opens
//! in a browser, the URL it redirects back to is pasted into the terminal)
//! and calls the backend's health, user and admin endpoints.

mod app;
mod ui;

use std::io;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tinyfront_core::api::ApiClient;
use tinyfront_core::config::{Config, DEFAULT_API_BASE_URL, ENV_API_BASE_URL};

use app::{App, AppState};
use ui::input::{handle_input, handle_paste};
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

const LOG_FILE_PREFIX: &str = "tinyfront.log";

/// Command line options
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    /// Print the health check and exit
    health: bool,
    /// URL the identity provider redirected back to
    callback: Option<String>,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--health" => parsed.health = true,
            "--callback" => {
                let url = iter.next().context("--callback needs a URL")?;
                parsed.callback = Some(url.clone());
            }
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(parsed)
}

/// Initialize the tracing subscriber for logging.
///
/// The terminal belongs to the UI, so logs go to a daily file under the
/// cache directory. Use RUST_LOG to control the level (e.g. RUST_LOG=debug).
fn init_tracing() -> Option<WorkerGuard> {
    let log_dir = Config::log_dir().ok()?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let _log_guard = init_tracing();
    info!("tinyfront starting");

    if args.health {
        return print_health().await;
    }

    let config = Config::from_env()?;
    let mut app = App::new(config)?;

    // The gate must be ready before the first frame
    app.initialize(args.callback.as_deref()).await;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    info!("tinyfront shutting down");
    Ok(())
}

/// `--health`: call `GET /` and print the result.
async fn print_health() -> Result<()> {
    let base_url =
        std::env::var(ENV_API_BASE_URL).unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
    let client = ApiClient::new(&base_url)?;
    let health = client
        .health()
        .await
        .context("Failed to fetch API health check")?;
    println!("{}", health.display());
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        // Draw UI
        terminal.draw(|f| render(f, app))?;

        // Poll for events with timeout to allow background updates
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    // Ctrl+C to quit
                    if key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        return Ok(());
                    }

                    if handle_input(app, key).await? {
                        return Ok(());
                    }
                }
                Event::Paste(text) => handle_paste(app, &text),
                _ => {}
            }
        }

        // Check for completed background tasks
        app.check_background_tasks();

        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}
