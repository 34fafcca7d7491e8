//! Render thread: owns the ColorLight output and drives the frame tick.
//!
//! The raw link socket is not shared between threads, so the output is
//! built on, and never leaves, a dedicated thread. The HTTP server talks
//! to it by sending `RenderCommand` values through an `mpsc` channel and
//! reads back a shared `DisplayStatus`.
//!
//! Every tick the current channel buffer is packed and sent, whether or
//! not anything changed: the receiver cards blank if the stream stops.

use crate::config::OutputConfig;
use crate::error::OutputError;
use crate::link::{LinkTransport, NullLink};
use crate::output::ColorLightOutput;
use crate::{media, pattern};
use crate::warnings::WarningHolder;
use crate::{Color, is_running};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Hue advance per tick for the test pattern, in degrees.
const HUE_STEP: u16 = 3;

// ── Commands ─────────────────────────────────────────────────────────

/// Commands sent from the HTTP server to the render thread.
#[derive(Debug)]
pub enum RenderCommand {
    /// Display a static image, scaled to the canvas
    ShowImage(PathBuf),
    /// Display a raw RGB canvas (width*height*3 bytes)
    ShowFrame(Vec<u8>),
    /// Scrolling hue sweep across the whole wall
    TestPattern,
    /// Stamp every panel with its output and chain number
    PanelTest,
    /// Blank the wall
    Clear,
    /// Freeze whatever is showing and go idle
    Stop,
}

// ── Status ───────────────────────────────────────────────────────────

/// What the wall is currently showing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Idle,
    ShowingImage,
    ShowingFrame,
    TestPattern,
    PanelTest,
}

/// Shared status; the render thread writes, HTTP handlers read.
#[derive(Clone, Debug, Serialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct DisplayStatus {
    pub state: DisplayState,
    /// Currently displayed media (if any)
    pub current_media: Option<String>,
    /// False if the output failed to initialize; see the warnings list
    pub output_enabled: bool,
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    pub channel_count: usize,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    /// Consecutive ticks that missed the send budget
    pub slow_frames: u32,
    pub version: String,
}

impl DisplayStatus {
    pub fn new() -> Self {
        Self {
            state: DisplayState::Idle,
            current_media: None,
            output_enabled: false,
            width: 0,
            height: 0,
            channel_count: 0,
            frames_sent: 0,
            frames_dropped: 0,
            slow_frames: 0,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn set_idle(&mut self) {
        self.state = DisplayState::Idle;
        self.current_media = None;
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock the shared status, recovering it if a holder panicked.
pub fn lock_status(status: &Mutex<DisplayStatus>) -> MutexGuard<'_, DisplayStatus> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Renderer ─────────────────────────────────────────────────────────

/// The channel buffer plus the output it feeds.
pub struct Renderer<L: LinkTransport> {
    output: ColorLightOutput<L>,
    channels: Vec<u8>,
    animating: bool,
    hue_offset: u16,
}

impl<L: LinkTransport> Renderer<L> {
    pub fn new(output: ColorLightOutput<L>) -> Self {
        let channels = vec![0; output.buffer_len()];
        Self {
            output,
            channels,
            animating: false,
            hue_offset: 0,
        }
    }

    pub fn output(&self) -> &ColorLightOutput<L> {
        &self.output
    }

    /// The canvas region of the channel buffer.
    pub fn canvas(&self) -> &[u8] {
        let start = self.output.start_channel();
        &self.channels[start..start + self.output.channel_count()]
    }

    fn canvas_mut(&mut self) -> &mut [u8] {
        let start = self.output.start_channel();
        let end = start + self.output.channel_count();
        &mut self.channels[start..end]
    }

    /// Fill the status with the output's geometry.
    pub fn publish_geometry(&self, status: &Mutex<DisplayStatus>) {
        let topology = self.output.topology();
        let mut s = lock_status(status);
        s.output_enabled = true;
        s.width = topology.width();
        s.height = topology.height();
        s.channel_count = self.output.channel_count();
    }

    pub fn handle(&mut self, cmd: RenderCommand, status: &Mutex<DisplayStatus>) {
        match cmd {
            RenderCommand::Clear => {
                self.animating = false;
                self.canvas_mut().fill(0);
                lock_status(status).set_idle();
            }

            RenderCommand::Stop => {
                self.animating = false;
                lock_status(status).set_idle();
            }

            RenderCommand::TestPattern => {
                self.animating = true;
                let mut s = lock_status(status);
                s.state = DisplayState::TestPattern;
                s.current_media = None;
            }

            RenderCommand::PanelTest => {
                self.animating = false;
                let start = self.output.start_channel();
                let canvas = &mut self.channels[start..start + self.output.channel_count()];
                canvas.fill(0);
                pattern::draw_panel_ids(self.output.topology(), canvas);
                let mut s = lock_status(status);
                s.state = DisplayState::PanelTest;
                s.current_media = None;
            }

            RenderCommand::ShowImage(path) => {
                let path_str = path.display().to_string();
                let (width, height) = {
                    let t = self.output.topology();
                    (t.width(), t.height())
                };

                match media::load_canvas_image(&path, width, height) {
                    Ok(img) if img.as_raw().len() == self.output.channel_count() => {
                        self.animating = false;
                        self.canvas_mut().copy_from_slice(img.as_raw());
                        let mut s = lock_status(status);
                        s.state = DisplayState::ShowingImage;
                        s.current_media = Some(path_str.clone());
                        tracing::info!("Displaying image: {}", path_str);
                    }
                    Ok(img) => {
                        tracing::error!(
                            "Image {} decoded to {} bytes, canvas needs {}",
                            path_str,
                            img.as_raw().len(),
                            self.output.channel_count()
                        );
                    }
                    Err(e) => {
                        tracing::error!("Failed to load image {}: {}", path_str, e);
                    }
                }
            }

            RenderCommand::ShowFrame(data) => {
                let expected = self.output.channel_count();
                if data.len() != expected {
                    tracing::error!(
                        "Invalid frame size: expected {} bytes, got {}",
                        expected,
                        data.len()
                    );
                    return;
                }
                self.animating = false;
                self.canvas_mut().copy_from_slice(&data);
                let mut s = lock_status(status);
                s.state = DisplayState::ShowingFrame;
                s.current_media = None;
            }
        }
    }

    fn draw_test_pattern(&mut self) {
        let (width, height) = {
            let t = self.output.topology();
            (t.width() as usize, t.height() as usize)
        };
        let offset = self.hue_offset;
        let canvas = self.canvas_mut();

        for y in 0..height {
            for x in 0..width {
                let hue = ((x * 360 / width.max(1)) as u16 + offset) % 360;
                let i = (y * width + x) * 3;
                canvas[i..i + 3].copy_from_slice(&Color::from_hue(hue).to_bytes());
            }
        }
        self.hue_offset = (offset + HUE_STEP) % 360;
    }

    /// Pack and send the current buffer once. Returns whether the whole
    /// frame made it onto the wire.
    pub fn tick(&mut self, status: &Mutex<DisplayStatus>) -> bool {
        if self.animating {
            self.draw_test_pattern();
        }

        if let Err(e) = self.output.prep_data(&mut self.channels) {
            tracing::error!("Failed to pack frame: {}", e);
            return false;
        }
        let (_, outcome) = self.output.send_data();

        let stats = self.output.stats();
        let mut s = lock_status(status);
        s.frames_sent = stats.frames_sent;
        s.frames_dropped = stats.frames_dropped;
        s.slow_frames = self.output.slow_count();

        outcome.is_sent()
    }

    /// Send one black frame so the wall does not freeze on the last image.
    pub fn blank(&mut self, status: &Mutex<DisplayStatus>) {
        self.animating = false;
        self.channels.fill(0);
        self.tick(status);
        lock_status(status).set_idle();
    }
}

// ── Render loop ──────────────────────────────────────────────────────

pub fn frame_period(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

/// Tick the output at `fps` until the channel closes or `running` clears.
///
/// Commands are applied between ticks as they arrive; they never delay
/// the next tick past its deadline.
pub fn render_loop<L: LinkTransport>(
    rx: Receiver<RenderCommand>,
    status: Arc<Mutex<DisplayStatus>>,
    output: ColorLightOutput<L>,
    fps: u32,
    running: Arc<AtomicBool>,
) {
    let mut renderer = Renderer::new(output);
    renderer.publish_geometry(&status);

    let period = frame_period(fps);
    let mut next_tick = Instant::now();

    tracing::info!(
        "Render thread started ({} fps, {} channels)",
        fps.max(1),
        renderer.output().channel_count()
    );

    while is_running(&running) {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(cmd) => {
                renderer.handle(cmd, &status);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Render thread: channel closed, shutting down.");
                break;
            }
        }

        renderer.tick(&status);

        next_tick += period;
        let now = Instant::now();
        if next_tick < now {
            next_tick = now;
        }
    }

    renderer.blank(&status);
    tracing::info!("Render thread stopped");
}

/// Build the output on the current thread and run the render loop on it.
///
/// With `dry_run` the output is built against a link that discards every
/// frame, so topology and plan can be checked without a NIC.
pub fn run_output(
    config: OutputConfig,
    dry_run: bool,
    warnings: WarningHolder,
    rx: Receiver<RenderCommand>,
    status: Arc<Mutex<DisplayStatus>>,
    fps: u32,
    running: Arc<AtomicBool>,
) {
    if dry_run {
        match ColorLightOutput::with_link(&config, NullLink, warnings) {
            Ok(output) => {
                output.dump_config();
                render_loop(rx, status, output, fps, running);
            }
            Err(e) => output_disabled(&status, &e),
        }
        return;
    }

    match ColorLightOutput::open(&config, warnings) {
        Ok(output) => {
            output.dump_config();
            render_loop(rx, status, output, fps, running);
        }
        Err(e) => output_disabled(&status, &e),
    }
}

fn output_disabled(status: &Mutex<DisplayStatus>, err: &OutputError) {
    tracing::error!("ColorLight output disabled: {}", err);
    lock_status(status).output_enabled = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmit::tests::MockLink;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{
        "startChannel": 3,
        "panelWidth": 4,
        "panelHeight": 2,
        "cfgVersion": 2,
        "panels": [
            {"outputNumber": 0, "panelNumber": 0, "orientation": "N", "xOffset": 0, "yOffset": 0},
            {"outputNumber": 0, "panelNumber": 1, "orientation": "N", "xOffset": 4, "yOffset": 0}
        ]
    }"#;

    fn renderer() -> Renderer<MockLink> {
        let config = OutputConfig::from_json(CONFIG).unwrap();
        let output =
            ColorLightOutput::with_link(&config, MockLink::default(), WarningHolder::new())
                .unwrap();
        Renderer::new(output)
    }

    fn status() -> Mutex<DisplayStatus> {
        Mutex::new(DisplayStatus::new())
    }

    #[test]
    fn geometry_is_published() {
        let r = renderer();
        let status = status();
        r.publish_geometry(&status);

        let s = lock_status(&status);
        assert!(s.output_enabled);
        assert_eq!((s.width, s.height, s.channel_count), (8, 2, 48));
    }

    #[test]
    fn raw_frame_fills_canvas_and_goes_out() {
        let mut r = renderer();
        let status = status();
        let frame: Vec<u8> = (0..48).collect();

        r.handle(RenderCommand::ShowFrame(frame.clone()), &status);
        assert_eq!(r.canvas(), frame.as_slice());
        assert_eq!(lock_status(&status).state, DisplayState::ShowingFrame);

        assert!(r.tick(&status));
        assert_eq!(lock_status(&status).frames_sent, 1);
        let row0 = &r.output().link().accepted[2].1;
        assert_eq!(&row0[0..3], &[0, 1, 2]);
    }

    #[test]
    fn wrong_size_frame_is_ignored() {
        let mut r = renderer();
        let status = status();
        r.handle(RenderCommand::ShowFrame(vec![1; 10]), &status);
        assert!(r.canvas().iter().all(|&b| b == 0));
        assert_eq!(lock_status(&status).state, DisplayState::Idle);
    }

    #[test]
    fn test_pattern_moves_every_tick() {
        let mut r = renderer();
        let status = status();
        r.handle(RenderCommand::TestPattern, &status);

        r.tick(&status);
        let first = r.canvas().to_vec();
        r.tick(&status);
        assert_ne!(first, r.canvas());
        assert_eq!(&first[0..3], &[255, 0, 0]);
    }

    #[test]
    fn panel_test_stamps_each_panel() {
        let mut r = renderer();
        let status = status();
        r.handle(RenderCommand::TestPattern, &status);
        r.tick(&status);

        r.handle(RenderCommand::PanelTest, &status);
        assert_eq!(lock_status(&status).state, DisplayState::PanelTest);
        let still = r.canvas().to_vec();
        r.tick(&status);
        assert_eq!(r.canvas(), still.as_slice());

        // 4x2 panels: local (2, 1) is the top of the output "1" on both.
        let white = [255, 255, 255];
        assert_eq!(&still[(8 + 2) * 3..(8 + 3) * 3], &white);
        assert_eq!(&still[(8 + 4 + 2) * 3..(8 + 4 + 3) * 3], &white);
    }

    #[test]
    fn stop_freezes_and_clear_blanks() {
        let mut r = renderer();
        let status = status();
        r.handle(RenderCommand::TestPattern, &status);
        r.tick(&status);

        r.handle(RenderCommand::Stop, &status);
        let frozen = r.canvas().to_vec();
        r.tick(&status);
        assert_eq!(r.canvas(), frozen.as_slice());
        assert_eq!(lock_status(&status).state, DisplayState::Idle);

        r.handle(RenderCommand::Clear, &status);
        assert!(r.canvas().iter().all(|&b| b == 0));
    }

    #[test]
    fn image_is_scaled_onto_canvas() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("green.png");
        RgbImage::from_pixel(8, 2, Rgb([0, 200, 0])).save(&path).unwrap();

        let mut r = renderer();
        let status = status();
        r.handle(RenderCommand::ShowImage(path), &status);

        assert_eq!(&r.canvas()[0..3], &[0, 200, 0]);
        assert_eq!(lock_status(&status).state, DisplayState::ShowingImage);
    }

    #[test]
    fn missing_image_leaves_state_alone() {
        let mut r = renderer();
        let status = status();
        r.handle(RenderCommand::ShowImage(PathBuf::from("/nope.png")), &status);
        assert_eq!(lock_status(&status).state, DisplayState::Idle);
    }

    #[test]
    fn frame_period_clamps_zero_fps() {
        assert_eq!(frame_period(40), Duration::from_millis(25));
        assert_eq!(frame_period(0), Duration::from_secs(1));
    }

    #[test]
    fn loop_ticks_until_channel_closes() {
        let config = OutputConfig::from_json(CONFIG).unwrap();
        let (tx, rx) = mpsc::channel();
        let status = Arc::new(Mutex::new(DisplayStatus::new()));
        let running = Arc::new(AtomicBool::new(true));

        let thread_status = status.clone();
        let handle = thread::spawn(move || {
            run_output(config, true, WarningHolder::new(), rx, thread_status, 200, running);
        });

        tx.send(RenderCommand::TestPattern).unwrap();
        thread::sleep(Duration::from_millis(100));
        drop(tx);
        handle.join().unwrap();

        let s = lock_status(&status);
        assert!(s.output_enabled);
        assert!(s.frames_sent > 1);
        assert_eq!(s.state, DisplayState::Idle);
    }

    #[test]
    fn bad_config_leaves_output_disabled() {
        let config = OutputConfig::from_json(r#"{"panelHeight": -1}"#).unwrap();
        let warnings = WarningHolder::new();
        let (_tx, rx) = mpsc::channel();
        let status = Arc::new(Mutex::new(DisplayStatus::new()));

        run_output(
            config,
            true,
            warnings.clone(),
            rx,
            status.clone(),
            40,
            Arc::new(AtomicBool::new(true)),
        );

        assert!(!lock_status(&status).output_enabled);
        assert_eq!(warnings.active().len(), 1);
    }
}
