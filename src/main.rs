use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::{self, OpenOptions},
    io,
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod conversations;
mod error;
mod i18n;
mod links;
mod mock;
mod tracking;
mod ui;

use app::App;
use config::{Preferences, Settings};
use i18n::Language;

fn cli() -> Command {
    Command::new("chatmock")
        .version("0.1.0")
        .author("chatmock Team")
        .about("Terminal chat mockup with visibility-based read receipts")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Read settings from FILE instead of the default config.toml"),
        )
        .arg(
            Arg::new("lang")
                .short('l')
                .long("lang")
                .value_name("CODE")
                .help("Interface language for this session (en, es, de)"),
        )
        .arg(
            Arg::new("reply-delay-ms")
                .long("reply-delay-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Delay before the simulated reply arrives"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Write logs to FILE"),
        )
        .arg(
            Arg::new("no-fallback")
                .long("no-fallback")
                .action(clap::ArgAction::SetTrue)
                .help("Run without visibility tracking; nothing is marked read automatically"),
        )
}

fn settings_from(matches: &ArgMatches) -> Result<Settings> {
    let config_path = matches.get_one::<PathBuf>("config");
    let mut settings =
        Settings::load(config_path.map(|p| p.as_path())).context("failed to load settings")?;
    settings.apply_env();

    if let Some(code) = matches.get_one::<String>("lang") {
        settings.language = Some(code.parse::<Language>()?);
    }
    if let Some(ms) = matches.get_one::<u64>("reply-delay-ms") {
        settings.reply_delay_ms = *ms;
    }
    if let Some(path) = matches.get_one::<PathBuf>("log-file") {
        settings.log_file = Some(path.clone());
    }
    if matches.get_flag("no-fallback") {
        settings.visibility_tracking = false;
    }
    Ok(settings)
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging(settings: &Settings) -> Result<()> {
    let path = settings.log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let settings = settings_from(&matches)?;
    init_logging(&settings)?;

    let preferences = Preferences::load_or_default(&Preferences::default_path());
    let data = mock::seed()?;
    let mut app = App::new(&settings, preferences, data);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!(error = ?err, "chat client exited with an error");
        println!("Error: {:?}", err);
    }
    info!("chat client closed");

    Ok(())
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(250);

    loop {
        let mut layout = None;
        terminal.draw(|f| layout = ui::draw(f, app))?;
        if let Some(layout) = layout {
            app.observe_thread(layout, Instant::now());
        }

        let timeout_duration = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout_duration)? {
            let event = event::read()?;
            app.handle_input(event)?;
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick(Instant::now())?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
