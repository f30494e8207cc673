use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use genbatch_core::download::{Downloader, DryRunDownloader, FileDownloader};
use genbatch_core::orchestrator::{self, Orchestrator};
use genbatch_core::page::{create_page, Backend};
use genbatch_core::queue::{build_queue, load_prompts};
use genbatch_core::settings::Settings;
use genbatch_core::sleep::SystemClock;
use genbatch_core::types::{Command, Notification};
use genbatch_core::logger;

/// Bulk prompt submission for a web media generator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Drive the simulated page instead of a browser
    #[arg(long)]
    stub: bool,

    /// DevTools websocket URL of an already running browser
    #[arg(long)]
    connect: Option<String>,

    /// Host page to open or attach to
    #[arg(long, default_value = "https://www.meta.ai/")]
    url: String,

    /// Prompts file, one prompt per blank-line-separated block
    #[arg(long)]
    prompts: Option<PathBuf>,

    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Root directory downloads are saved under
    #[arg(long, default_value = ".")]
    downloads: PathBuf,

    /// Reference image attached to each batch
    #[arg(long)]
    reference: Option<PathBuf>,
}

fn backend(args: &Args) -> Backend {
    if args.stub {
        return Backend::Stub;
    }
    #[cfg(feature = "chrome")]
    {
        Backend::Chrome(genbatch_core::page::chrome::ChromeOptions {
            connect: args.connect.clone(),
            url: args.url.clone(),
        })
    }
    #[cfg(not(feature = "chrome"))]
    {
        logger::warn(&format!("built without the chrome feature, simulating {}", args.url));
        if args.connect.is_some() {
            logger::warn("--connect ignored");
        }
        Backend::Stub
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logs_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("logs");
    logger::init(&logs_dir)?;

    let (log_tx, log_rx) = mpsc::channel::<String>();
    let (notify_tx, events_rx) = mpsc::channel::<Notification>();
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

    logger::set_ui_sender(log_tx);
    logger::info("genbatch started");

    let settings = Settings::load_or_recover(&args.settings);
    let reference_image = match &args.reference {
        Some(path) => Some(fs::read(path).with_context(|| format!("reading {}", path.display()))?),
        None => None,
    };

    let backend = backend(&args);
    let simulated = matches!(backend, Backend::Stub);
    let page = create_page(backend)?;

    let downloader: Box<dyn Downloader> = if simulated {
        Box::new(DryRunDownloader { folder: settings.profile.download_folder.clone() })
    } else {
        Box::new(FileDownloader::spawn(args.downloads.clone(), settings.profile.download_folder.clone())?)
    };

    let orch = Orchestrator::new(page, downloader, Arc::new(SystemClock::new()), settings.profile.clone(), notify_tx);
    let queue = orch.queue();
    let controller = orch.controller(cmd_tx);

    if let Some(path) = &args.prompts {
        match load_prompts(path) {
            Ok(prompts) => {
                logger::info(&format!("loaded {} prompt(s) from {}", prompts.len(), path.display()));
                *queue.lock().unwrap_or_else(|e| e.into_inner()) = build_queue(&prompts);
            }
            Err(e) => logger::error(&format!("{:#}", e)),
        }
    }

    let orch_thread = thread::spawn(move || orchestrator::orchestrate(orch, cmd_rx));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = genbatch_tui::App::new(
        queue,
        controller,
        settings,
        args.settings.clone(),
        args.prompts.clone(),
        reference_image,
        log_rx,
        events_rx,
    );

    let result = genbatch_tui::event::run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // The orchestrator returns once its current step sees the cancel
    if !app.should_quit {
        app.quit();
    }
    orch_thread.join().ok();

    result
}
