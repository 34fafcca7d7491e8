//! ColorLight wall driver.
//!
//! Loads an output configuration, opens the raw link and streams the wall
//! at a fixed frame rate. With the `server` feature (default) an HTTP API
//! accepts images, raw frames and test-pattern requests.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the output and its raw socket, ticks at `--fps`
//! - **HTTP server** (tokio/axum): accepts API requests, sends commands via channel
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/colorlight-wall --config wall.json --media-dir /srv/media --port 8080
//! ```

use clap::Parser;
use colorlight_wall::config::OutputConfig;
use colorlight_wall::render::{DisplayStatus, RenderCommand, run_output};
use colorlight_wall::setup_signal_handler;
use colorlight_wall::warnings::WarningHolder;
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing_subscriber::EnvFilter;

/// ColorLight 5a-75 video-wall driver
#[derive(Parser)]
#[command(name = "colorlight-wall")]
#[command(about = "Drive a ColorLight 5a-75 LED wall over raw Ethernet")]
#[command(version)]
struct Args {
    /// Output configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Root directory containing an images/ subdirectory
    #[arg(long, default_value = ".")]
    media_dir: PathBuf,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Frames sent to the wall per second
    #[arg(long, default_value = "40")]
    fps: u32,

    /// Build everything but discard frames instead of opening the link
    #[arg(long)]
    dry_run: bool,

    /// Start with the hue-sweep test pattern
    #[arg(long)]
    test_pattern: bool,

    /// Start with every panel showing its output and chain number
    #[arg(long, conflicts_with = "test_pattern")]
    panel_test: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false) // systemd/journald
        .compact()
        .init();
}

struct Driver {
    command_tx: Sender<RenderCommand>,
    status: Arc<Mutex<DisplayStatus>>,
    warnings: WarningHolder,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Load the config and start the render thread.
fn start_driver(args: &Args) -> Result<Driver, Box<dyn Error>> {
    let config = OutputConfig::load(&args.config)?;
    let running = setup_signal_handler()?;

    tracing::info!("ColorLight wall v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Config: {}", args.config.display());
    tracing::info!("Interface: {}", config.interface());
    if args.dry_run {
        tracing::info!("Dry run: frames will not be sent");
    }

    let (tx, rx) = mpsc::channel();
    let status = Arc::new(Mutex::new(DisplayStatus::new()));
    let warnings = WarningHolder::new();

    let handle = {
        let status = status.clone();
        let warnings = warnings.clone();
        let running = running.clone();
        let dry_run = args.dry_run;
        let fps = args.fps;
        thread::Builder::new()
            .name("render".into())
            .spawn(move || run_output(config, dry_run, warnings, rx, status, fps, running))?
    };

    if args.test_pattern {
        tx.send(RenderCommand::TestPattern)?;
    } else if args.panel_test {
        tx.send(RenderCommand::PanelTest)?;
    }

    Ok(Driver {
        command_tx: tx,
        status,
        warnings,
        running,
        handle,
    })
}

fn join_render_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("Render thread panicked");
    }
}

#[cfg(not(feature = "server"))]
fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let args = Args::parse();
    let Driver {
        command_tx,
        status,
        warnings,
        running,
        handle,
    } = start_driver(&args)?;

    // No HTTP surface: keep the channel open until Ctrl+C or until the
    // render thread gives up on its own.
    while colorlight_wall::is_running(&running) && !handle.is_finished() {
        thread::sleep(std::time::Duration::from_millis(200));
    }
    drop(command_tx);
    join_render_thread(handle);

    let s = colorlight_wall::render::lock_status(&status);
    tracing::info!("Sent {} frames, dropped {}", s.frames_sent, s.frames_dropped);
    for w in warnings.active() {
        tracing::warn!("{}", w.message);
    }
    Ok(())
}

#[cfg(feature = "server")]
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    use colorlight_wall::server::{self, AppState};

    init_tracing();
    let args = Args::parse();

    let media_dir = args.media_dir.canonicalize().unwrap_or_else(|_| {
        tracing::warn!("could not canonicalize media dir, using as-is");
        args.media_dir.clone()
    });
    tracing::info!("Media dir: {}", media_dir.display());

    let Driver {
        command_tx,
        status,
        warnings,
        running,
        handle,
    } = start_driver(&args)?;

    let app = server::create_router(AppState {
        command_tx,
        status,
        warnings,
        media_dir,
    });

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(running))
        .await?;

    // The router (and its command sender) is gone; the render thread
    // blanks the wall and exits.
    join_render_thread(handle);
    Ok(())
}

#[cfg(feature = "server")]
async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    while colorlight_wall::is_running(&running) {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    tracing::info!("Shutting down");
}
