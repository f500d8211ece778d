mod app;
mod ui;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use app::{poll_event, App, AppAction};
use clap::Parser;
use crossterm::event::Event;
use ratatui::DefaultTerminal;
use speedprobe::settings::{init_logging, Settings};
use speedprobe::speedtest::SpeedTest;
use ui::draw_ui;

#[derive(Parser, Debug)]
#[command(name = "speedprobe")]
#[command(about = "Measure latency, jitter, download and upload speed")]
struct Args {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run once and print the results instead of opening the terminal UI
    #[arg(long)]
    headless: bool,

    /// Log filter, e.g. "debug" or "speedprobe=trace"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }

    if args.headless {
        return run_headless(settings).await;
    }

    // Logging to the terminal would draw over the UI.
    if settings.logging.file.is_some() {
        init_logging(&settings.logging)?;
    }
    let engine = SpeedTest::new(settings)?;

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, engine).await;

    ratatui::restore();
    result
}

async fn run_headless(settings: Settings) -> Result<()> {
    init_logging(&settings.logging)?;
    let engine = SpeedTest::new(settings)?;

    let result = engine.run().await.context("speed test did not complete")?;

    println!("Ping:     {:.0} ms", result.ping_ms);
    println!("Jitter:   {:.2} ms", result.jitter_ms);
    println!("Download: {:.0} Mbps", result.download_mbps);
    println!("Upload:   {:.0} Mbps", result.upload_mbps);
    Ok(())
}

async fn run_app(terminal: &mut DefaultTerminal, engine: SpeedTest) -> Result<()> {
    let mut app = App::new(engine);

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            match app.handle_key_event(key) {
                Some(AppAction::Quit) => break,
                Some(AppAction::StartTest) => {
                    app.engine.start();
                }
                Some(AppAction::Reset) => app.engine.reset(),
                None => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    app.engine.reset();
    Ok(())
}
