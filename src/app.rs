use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{error, info};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::config::RenderConfig;
use crate::error::PipelineError;
use crate::frame::FrameImage;
use crate::orchestrator::{Orchestrator, OrchestratorContext, PresentOutcome, Presenter, RunState};
use crate::render::{BufferExchange, GpuContext, WindowPresenter};

/// Paces frames to a target rate. A target of zero renders as fast as possible.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Option<Duration>,
    last_frame: Option<Instant>,
    smoothed_fps: f32,
}

impl FramePacer {
    const SMOOTHING: f32 = 0.05;

    pub fn new(target_fps: u32) -> Self {
        let interval = (target_fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(target_fps)));
        Self {
            interval,
            last_frame: None,
            smoothed_fps: target_fps as f32,
        }
    }

    /// Earliest instant the next frame may start, if pacing applies.
    pub fn next_deadline(&self) -> Option<Instant> {
        Some(self.last_frame? + self.interval?)
    }

    pub fn should_render(&self, now: Instant) -> bool {
        self.next_deadline().map_or(true, |deadline| now >= deadline)
    }

    pub fn end_frame(&mut self, now: Instant) {
        if let Some(last) = self.last_frame {
            let frame_time = now.duration_since(last).as_secs_f32();
            if frame_time > 0.0 {
                self.smoothed_fps =
                    self.smoothed_fps * (1.0 - Self::SMOOTHING) + Self::SMOOTHING / frame_time;
            }
        }
        self.last_frame = Some(now);
    }

    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }
}

/// Presenter for runs without a window: keeps the latest frame and counts.
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    frames: u64,
    last: Option<FrameImage>,
}

impl HeadlessPresenter {
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameImage> {
        self.last.as_ref()
    }
}

impl Presenter for HeadlessPresenter {
    fn present(&mut self, frame: &FrameImage) -> Result<PresentOutcome, PipelineError> {
        self.frames += 1;
        self.last = Some(frame.clone());
        Ok(PresentOutcome::Presented)
    }
}

/// Outcome of a headless run.
#[derive(Debug, Clone)]
pub struct HeadlessSummary {
    pub frames: u64,
    pub resolution: (u32, u32),
    pub sphere_count: u32,
    pub lit_pixels: usize,
}

impl fmt::Display for HeadlessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.resolution;
        write!(
            f,
            "Rendered {} frames at {width}x{height} ({} spheres); last frame lit {} of {} pixels",
            self.frames,
            self.sphere_count,
            self.lit_pixels,
            width as usize * height as usize
        )
    }
}

/// Renders `frames` frames on a device without a window.
pub fn run_headless(config: &RenderConfig, frames: u64) -> Result<HeadlessSummary> {
    let resolution = config.logical_resolution();
    let gpu = block_on(GpuContext::headless()).context("failed to initialise GPU")?;
    let exchange = BufferExchange::new(&gpu, resolution, config.sphere_count as usize)
        .context("failed to build compute pipeline")?;
    let mut orchestrator =
        Orchestrator::new(OrchestratorContext::new(config.sphere_count), exchange);
    let mut presenter = HeadlessPresenter::default();

    let rendered = orchestrator
        .run(&mut presenter, |context| context.frames >= frames)
        .context("frame loop failed")?;
    info!("Headless run finished after {rendered} frames");

    Ok(HeadlessSummary {
        frames: rendered,
        resolution,
        sphere_count: config.sphere_count,
        lit_pixels: presenter.last_frame().map_or(0, FrameImage::lit_pixels),
    })
}

/// Opens a window and renders until it is closed. Returns the presented frame count.
pub fn run_windowed(config: RenderConfig) -> Result<u64> {
    let event_loop =
        EventLoop::new().map_err(|err| WindowInitError::from_error("event loop", err))?;
    let mut app = SpheresApp::new(config);
    event_loop.run_app(&mut app).context("event loop failed")?;
    app.finish()
}

/// The windowing system could not be brought up; the caller may fall back to headless.
#[derive(Debug)]
pub struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

struct WindowSession {
    presenter: WindowPresenter,
    orchestrator: Orchestrator<BufferExchange>,
}

struct SpheresApp {
    config: RenderConfig,
    pacer: FramePacer,
    session: Option<WindowSession>,
    last_error: Option<anyhow::Error>,
}

impl SpheresApp {
    fn new(config: RenderConfig) -> Self {
        let pacer = FramePacer::new(config.target_fps);
        Self {
            config,
            pacer,
            session: None,
            last_error: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<WindowSession> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let instance = GpuContext::create_instance();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create window surface")?;
        let gpu = block_on(GpuContext::new(instance, Some(&surface)))
            .context("failed to initialise GPU")?;
        let presenter = WindowPresenter::new(window, surface, &gpu)?;
        let exchange = BufferExchange::new(
            &gpu,
            self.config.logical_resolution(),
            self.config.sphere_count as usize,
        )
        .context("failed to build compute pipeline")?;
        let orchestrator =
            Orchestrator::new(OrchestratorContext::new(self.config.sphere_count), exchange);

        Ok(WindowSession {
            presenter,
            orchestrator,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("Stopping: {err:#}");
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(session) = self.session.as_mut() {
            session.orchestrator.request_stop();
        }
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if !self.pacer.should_render(now) {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.orchestrator.tick(&mut session.presenter) {
            Ok(RunState::Running) => self.pacer.end_frame(now),
            Ok(RunState::Stopped) => event_loop.exit(),
            Err(err) => self.fail(event_loop, err.into()),
        }
    }

    fn finish(self) -> Result<u64> {
        if let Some(err) = self.last_error {
            return Err(err);
        }
        let (frames, dropped) = self.session.map_or((0, 0), |session| {
            let context = session.orchestrator.context();
            (context.frames, context.dropped)
        });
        info!(
            "Window closed after {frames} frames, {dropped} dropped ({:.1} fps)",
            self.pacer.fps()
        );
        Ok(frames)
    }
}

impl ApplicationHandler for SpheresApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(session) => {
                session.presenter.window().request_redraw();
                self.session = Some(session);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if window_id != session.presenter.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => self.stop(event_loop),
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape) =>
            {
                self.stop(event_loop)
            }
            WindowEvent::Resized(size) => session.presenter.resize(size),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.orchestrator.state() == RunState::Stopped {
            return;
        }
        match self.pacer.next_deadline() {
            Some(deadline) if deadline > Instant::now() => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
            _ => {
                event_loop.set_control_flow(ControlFlow::Poll);
                session.presenter.window().request_redraw();
            }
        }
    }
}
