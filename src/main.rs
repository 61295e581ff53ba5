use std::fs::File;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{error, info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, WriteLogger};

use marginalia::backend::{Backend, HttpBackend, UploadFile};
use marginalia::document::{DocumentSource, RenderEngine};
use marginalia::event_source::TerminalEventSource;
use marginalia::panic_handler;
use marginalia::session::upload_and_fetch;
use marginalia::settings::{self, Settings};
use marginalia::viewer::RenderPipeline;
use marginalia::{App, AppOptions, Session, run_app_with_event_source};

const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "marginalia", version, about = "Terminal PDF viewer with annotations")]
struct Cli {
    /// Settings file (defaults to $MARGINALIA_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overrides `backend_url` from the settings
    #[arg(long, global = true)]
    backend: Option<String>,

    #[arg(long, global = true, default_value = "marginalia.log")]
    log_file: PathBuf,

    /// Open a local PDF on startup
    #[arg(long)]
    open: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send a query to the backend and print the answer
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Upload a PDF to the backend
    Upload { file: PathBuf },
    /// Render one page to a PNG file
    Render {
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        scale: Option<f32>,
        #[arg(long)]
        out: PathBuf,
    },
}

/// Settings plus a deferred message, logged once the logger exists
fn load_settings(explicit: Option<&Path>) -> (Settings, Option<String>) {
    let Some(path) = settings::config_path(explicit) else {
        return (
            Settings::default(),
            Some("Could not determine config directory, using default settings".to_string()),
        );
    };
    match Settings::load_or_create(&path) {
        Ok(settings) => (settings, None),
        Err(e) => (
            Settings::default(),
            Some(format!("{e:#}, using default settings")),
        ),
    }
}

#[cfg(feature = "pdf")]
fn default_engine() -> Result<Arc<dyn RenderEngine>> {
    Ok(Arc::new(marginalia::document::MupdfEngine))
}

#[cfg(not(feature = "pdf"))]
fn default_engine() -> Result<Arc<dyn RenderEngine>> {
    bail!("marginalia was built without the `pdf` feature")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut settings, settings_warning) = load_settings(cli.config.as_deref());
    if let Some(url) = &cli.backend {
        settings.backend_url = url.clone();
    }

    WriteLogger::init(
        settings.log_level_filter(),
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Failed to create log file {}", cli.log_file.display()))?,
    )?;
    info!("Starting marginalia {}", env!("CARGO_PKG_VERSION"));
    if let Some(message) = settings_warning {
        warn!("{message}");
    }

    let http = HttpBackend::new(&settings.backend_url, settings.request_timeout())?;
    info!("Using backend at {}", http.base_url());
    let backend: Arc<dyn Backend> = Arc::new(http);

    let result = match cli.command {
        Some(Command::Ask { query }) => ask(backend.as_ref(), &query.join(" ")),
        Some(Command::Upload { file }) => upload(backend.as_ref(), &file, &settings),
        Some(Command::Render {
            file,
            page,
            scale,
            out,
        }) => render(&file, page, scale.unwrap_or(settings.initial_scale), &out, &settings),
        None => run_tui(&settings, backend, cli.open),
    };

    if let Err(e) = &result {
        error!("Application error: {e:?}");
    }
    info!("Shutting down marginalia");
    result
}

fn ask(backend: &dyn Backend, query: &str) -> Result<()> {
    let answer = backend.ask(query)?;
    println!("{answer}");
    Ok(())
}

fn upload(backend: &dyn Backend, path: &Path, settings: &Settings) -> Result<()> {
    let file = UploadFile::from_path(path, settings.max_upload_bytes)?;
    let (receipt, bytes) = upload_and_fetch(backend, &file)?;
    println!(
        "Uploaded {} ({} bytes served back)",
        receipt.filename.as_deref().unwrap_or(&file.name),
        bytes.len()
    );
    Ok(())
}

fn render(path: &Path, page: usize, scale: f32, out: &Path, settings: &Settings) -> Result<()> {
    let zoom = settings.zoom_policy();
    let mut pipeline = RenderPipeline::new(default_engine()?, zoom.clamp(scale), zoom);
    let info = pipeline
        .load(DocumentSource::from_path(path))
        .with_context(|| format!("Could not load {}", path.display()))?;
    if page == 0 || page > info.page_count {
        bail!("page {page} is out of range (document has {} pages)", info.page_count);
    }

    pipeline.go_to_page(page);
    let events = pipeline.wait_idle(RENDER_TIMEOUT);
    for event in events {
        if let marginalia::viewer::PipelineEvent::Failed { page, error } = event {
            bail!("Could not render page {page}: {error}");
        }
    }

    let view = pipeline
        .view()
        .filter(|v| v.page == page)
        .context("Render did not finish in time")?;
    view.surface.write_png(out)?;
    println!(
        "Page {page} of {} at scale {:.2} -> {} ({}x{})",
        info.page_count,
        view.viewport.scale,
        out.display(),
        view.surface.width_px,
        view.surface.height_px
    );
    Ok(())
}

fn run_tui(settings: &Settings, backend: Arc<dyn Backend>, open: Option<PathBuf>) -> Result<()> {
    let engine = default_engine()?;
    panic_handler::initialize_panic_handler();

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let session = Session::new(engine, backend, settings.session_config());
    let mut app = App::new(session, AppOptions::default());
    if let Some(path) = open {
        app.open_local(&path);
    }

    let res = run_app_with_event_source(&mut terminal, &mut app, &mut TerminalEventSource);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;
    app.session_mut().pipeline_mut().shutdown();

    res
}
