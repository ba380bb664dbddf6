use std::time::Instant;

use log::{debug, error, info};

use crate::error::PipelineError;
use crate::frame::FrameImage;
use crate::scene::{self, Camera, DirectionalLight, Sphere};

/// Produces a frame image for a given scene.
pub trait FrameRenderer {
    fn render(
        &mut self,
        spheres: &[Sphere],
        camera: &Camera,
        light: &DirectionalLight,
    ) -> Result<FrameImage, PipelineError>;
}

/// Whether a frame reached the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The display was not ready; the frame was discarded.
    Dropped,
}

/// Receives finished frames.
pub trait Presenter {
    fn present(&mut self, frame: &FrameImage) -> Result<PresentOutcome, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

/// Monotonic animation clock.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    start: Instant,
}

impl FrameClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }
}

/// State owned by the frame loop for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct OrchestratorContext {
    pub state: RunState,
    pub clock: FrameClock,
    pub frames: u64,
    pub dropped: u64,
    pub sphere_count: u32,
    pub camera: Camera,
    pub light: DirectionalLight,
}

impl OrchestratorContext {
    pub fn new(sphere_count: u32) -> Self {
        Self {
            state: RunState::Running,
            clock: FrameClock::start(),
            frames: 0,
            dropped: 0,
            sphere_count,
            camera: Camera::default(),
            light: DirectionalLight::default(),
        }
    }
}

/// Drives generate → render → present once per tick until stopped.
pub struct Orchestrator<R> {
    context: OrchestratorContext,
    renderer: R,
}

impl<R: FrameRenderer> Orchestrator<R> {
    pub fn new(context: OrchestratorContext, renderer: R) -> Self {
        Self { context, renderer }
    }

    pub fn context(&self) -> &OrchestratorContext {
        &self.context
    }

    pub fn state(&self) -> RunState {
        self.context.state
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Takes effect at the next frame boundary.
    pub fn request_stop(&mut self) {
        if self.context.state == RunState::Running {
            info!("Stop requested after {} frames", self.context.frames);
        }
        self.context.state = RunState::Stopped;
    }

    /// Renders the scene as it looks at `time` seconds.
    pub fn render_at(&mut self, time: f32) -> Result<FrameImage, PipelineError> {
        let spheres = scene::generate(time, self.context.sphere_count);
        self.renderer
            .render(&spheres, &self.context.camera, &self.context.light)
    }

    /// Renders and presents one frame. Any failure stops the loop; only
    /// frames that reach the presenter's output are counted.
    pub fn tick(&mut self, presenter: &mut dyn Presenter) -> Result<RunState, PipelineError> {
        if self.context.state == RunState::Stopped {
            return Ok(RunState::Stopped);
        }

        let time = self.context.clock.elapsed_secs();
        let outcome = self
            .render_at(time)
            .and_then(|frame| presenter.present(&frame).map(|outcome| (frame, outcome)));
        match outcome {
            Ok((frame, PresentOutcome::Presented)) => {
                self.context.frames += 1;
                debug!(
                    "Frame {} at t={time:.3}s: {} lit pixels",
                    self.context.frames,
                    frame.lit_pixels()
                );
                Ok(self.context.state)
            }
            Ok((_, PresentOutcome::Dropped)) => {
                self.context.dropped += 1;
                debug!("Frame at t={time:.3}s dropped by the presenter");
                Ok(self.context.state)
            }
            Err(err) => {
                error!("Frame {} failed: {err}", self.context.frames + 1);
                self.context.state = RunState::Stopped;
                Err(err)
            }
        }
    }

    /// Ticks until `stop` returns true or a frame fails; returns the frame count.
    pub fn run<F>(&mut self, presenter: &mut dyn Presenter, mut stop: F) -> Result<u64, PipelineError>
    where
        F: FnMut(&OrchestratorContext) -> bool,
    {
        while self.context.state == RunState::Running {
            if stop(&self.context) {
                self.request_stop();
                break;
            }
            self.tick(presenter)?;
        }
        Ok(self.context.frames)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[derive(Default)]
    struct CountingRenderer {
        calls: usize,
        fail_on: Option<usize>,
        last_count: usize,
    }

    impl FrameRenderer for CountingRenderer {
        fn render(
            &mut self,
            spheres: &[Sphere],
            _camera: &Camera,
            _light: &DirectionalLight,
        ) -> Result<FrameImage, PipelineError> {
            self.calls += 1;
            self.last_count = spheres.len();
            if self.fail_on == Some(self.calls) {
                return Err(PipelineError::Dispatch("device lost".to_string()));
            }
            FrameImage::from_colors(2, 1, [Vec3::ONE, Vec3::ZERO])
                .ok_or_else(|| PipelineError::Readback("bad frame".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        frames: Vec<FrameImage>,
    }

    impl Presenter for RecordingPresenter {
        fn present(&mut self, frame: &FrameImage) -> Result<PresentOutcome, PipelineError> {
            self.frames.push(frame.clone());
            Ok(PresentOutcome::Presented)
        }
    }

    /// Drops every other frame, like a surface that keeps going stale.
    #[derive(Default)]
    struct FlakyPresenter {
        calls: u64,
    }

    impl Presenter for FlakyPresenter {
        fn present(&mut self, _frame: &FrameImage) -> Result<PresentOutcome, PipelineError> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                Ok(PresentOutcome::Dropped)
            } else {
                Ok(PresentOutcome::Presented)
            }
        }
    }

    #[test]
    fn run_presents_until_stop_signal() {
        let mut orchestrator =
            Orchestrator::new(OrchestratorContext::new(6), CountingRenderer::default());
        let mut presenter = RecordingPresenter::default();

        let frames = orchestrator
            .run(&mut presenter, |context| context.frames >= 3)
            .unwrap();

        assert_eq!(frames, 3);
        assert_eq!(presenter.frames.len(), 3);
        assert_eq!(orchestrator.state(), RunState::Stopped);
        assert_eq!(orchestrator.renderer().last_count, 6);
    }

    #[test]
    fn failed_frame_stops_without_presenting() {
        let renderer = CountingRenderer {
            fail_on: Some(2),
            ..CountingRenderer::default()
        };
        let mut orchestrator = Orchestrator::new(OrchestratorContext::new(1), renderer);
        let mut presenter = RecordingPresenter::default();

        let result = orchestrator.run(&mut presenter, |_| false);

        assert!(matches!(result, Err(PipelineError::Dispatch(_))));
        assert_eq!(presenter.frames.len(), 1);
        assert_eq!(orchestrator.state(), RunState::Stopped);
        assert_eq!(orchestrator.context().frames, 1);
    }

    #[test]
    fn stopped_orchestrator_does_not_render() {
        let mut orchestrator =
            Orchestrator::new(OrchestratorContext::new(2), CountingRenderer::default());
        let mut presenter = RecordingPresenter::default();

        orchestrator.request_stop();
        assert_eq!(orchestrator.tick(&mut presenter).unwrap(), RunState::Stopped);
        assert_eq!(orchestrator.renderer().calls, 0);
        assert!(presenter.frames.is_empty());
    }

    #[test]
    fn dropped_frames_are_not_counted_as_presented() {
        let mut orchestrator =
            Orchestrator::new(OrchestratorContext::new(3), CountingRenderer::default());
        let mut presenter = FlakyPresenter::default();

        for _ in 0..4 {
            assert_eq!(orchestrator.tick(&mut presenter).unwrap(), RunState::Running);
        }

        assert_eq!(orchestrator.context().frames, 2);
        assert_eq!(orchestrator.context().dropped, 2);
        assert_eq!(orchestrator.renderer().calls, 4);
    }

    #[test]
    fn clock_is_monotonic() {
        let clock = FrameClock::start();
        let first = clock.elapsed_secs();
        let second = clock.elapsed_secs();
        assert!(second >= first);
    }
}
