//! The application context that ties the engine together.
//!
//! An [`Application`] is an ordinary value: create as many as you like, drive
//! each with [`Application::run_frame`] from the thread that owns its
//! graphics context, and feed it platform events through the
//! [`PlatformSender`](crate::PlatformSender) half of its bridge.

use log::{debug, error, info, warn};

use crate::camera::Camera;
use crate::config::AppConfig;
use crate::error::{RenderError, Result};
use crate::events::{Dispatcher, Event, EventKind, SubscriptionId};
use crate::gls::{GlContext, GraphicsState};
use crate::gui::{GuiEvent, GuiRoot};
use crate::logging::init_logging;
use crate::orbit_control::OrbitControl;
use crate::platform::{LifecycleBridge, PlatformEvent};
use crate::renderer::{FrameReport, Renderer};
use crate::scene::Scene;
use crate::time::{FrameClock, FrameRater};

/// Supplies a graphics context whenever the platform reports one is available.
pub trait ContextProvider {
    fn create_context(&mut self) -> Result<Box<dyn GlContext>>;
}

impl<F> ContextProvider for F
where
    F: FnMut() -> Result<Box<dyn GlContext>>,
{
    fn create_context(&mut self) -> Result<Box<dyn GlContext>> {
        self()
    }
}

/// Shows a finished frame (swap buffers, publish to the platform view).
pub trait Presenter {
    fn present(&mut self);
}

impl<F: FnMut()> Presenter for F {
    fn present(&mut self) {
        self()
    }
}

pub struct Application {
    config: AppConfig,
    dispatcher: Dispatcher,
    bridge: LifecycleBridge,
    pending: Vec<PlatformEvent>,
    gui_events: Vec<GuiEvent>,
    provider: Box<dyn ContextProvider>,
    presenter: Option<Box<dyn Presenter>>,
    state: Option<GraphicsState>,
    renderer: Renderer,
    pub scene: Scene,
    pub camera: Camera,
    pub gui: GuiRoot,
    orbit: Option<OrbitControl>,
    clock: FrameClock,
    rater: FrameRater,
    visible: bool,
    running: bool,
    size: (u32, u32),
    frames: u64,
    dropped: u64,
    last_report: Option<FrameReport>,
}

impl Application {
    /// Creates an application that receives platform events through `bridge`.
    ///
    /// No context exists until the platform posts [`PlatformEvent::Alive`].
    pub fn new(config: AppConfig, bridge: LifecycleBridge, provider: impl ContextProvider + 'static) -> Self {
        init_logging(config.logging());
        info!("starting {} ({}x{})", config.title, config.width, config.height);

        let mut camera = Camera::new();
        camera.set_aspect(config.aspect());
        let orbit = config.orbit_control.then(|| OrbitControl::from_camera(&camera));
        let mut renderer = Renderer::new();
        renderer.clear_color = config.clear_color;

        Self {
            rater: FrameRater::new(config.target_fps),
            size: (config.width, config.height),
            config,
            dispatcher: Dispatcher::new(),
            bridge,
            pending: Vec::new(),
            gui_events: Vec::new(),
            provider: Box::new(provider),
            presenter: None,
            state: None,
            renderer,
            scene: Scene::new(),
            camera,
            gui: GuiRoot::new(),
            orbit,
            clock: FrameClock::new(),
            visible: false,
            running: true,
            frames: 0,
            dropped: 0,
            last_report: None,
        }
    }

    pub fn set_presenter(&mut self, presenter: impl Presenter + 'static) {
        self.presenter = Some(Box::new(presenter));
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe(&mut self, kind: EventKind, callback: impl FnMut(&Event) + 'static) -> SubscriptionId {
        self.dispatcher.subscribe(kind, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    pub fn state(&self) -> Option<&GraphicsState> {
        self.state.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut GraphicsState> {
        self.state.as_mut()
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn orbit(&self) -> Option<&OrbitControl> {
        self.orbit.as_ref()
    }

    pub fn orbit_mut(&mut self) -> Option<&mut OrbitControl> {
        self.orbit.as_mut()
    }

    /// Panel events produced during the last frame.
    pub fn gui_events(&self) -> &[GuiEvent] {
        &self.gui_events
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    pub fn last_report(&self) -> Option<FrameReport> {
        self.last_report
    }

    /// Runs one frame. Returns `false` once the platform asked to quit.
    pub fn run_frame(&mut self) -> bool {
        self.rater.start();
        let time = self.clock.tick();

        self.gui_events.clear();
        let mut pending = std::mem::take(&mut self.pending);
        self.bridge.drain_into(&mut pending);
        for event in pending.drain(..) {
            self.handle_platform_event(event);
        }
        self.pending = pending;

        if !self.running {
            return false;
        }

        if let Some(orbit) = &mut self.orbit {
            orbit.update(time.dt);
            orbit.apply(&mut self.camera);
        }

        let frame = self.frames;
        self.dispatcher.dispatch(&Event::BeforeRender { frame });

        let mut rendered = false;
        if self.visible {
            match self.render_now() {
                Ok(report) => rendered = report.rendered,
                Err(e) => {
                    self.dropped += 1;
                    error!("frame {frame} dropped: {e}");
                }
            }
        }

        self.dispatcher
            .dispatch(&Event::AfterRender { frame, rendered });
        self.frames += 1;
        self.rater.wait();
        true
    }

    /// Renders and presents immediately, regardless of visibility.
    pub fn render_now(&mut self) -> Result<FrameReport> {
        let state = self.state.as_mut().ok_or(RenderError::NoContext)?;
        let report = self
            .renderer
            .render(state, &mut self.scene, &self.camera, Some(&mut self.gui))?;
        self.last_report = Some(report);
        if report.rendered
            && let Some(presenter) = &mut self.presenter
        {
            presenter.present();
        }
        Ok(report)
    }

    fn handle_platform_event(&mut self, event: PlatformEvent) {
        debug!("platform event {event:?}");
        match event {
            PlatformEvent::Alive => self.attach_context(),
            PlatformEvent::Foreground => {
                if self.state.is_none() {
                    self.attach_context();
                }
                self.visible = self.state.is_some();
                self.clock.reset();
                self.renderer.invalidate();
                self.gui.mark_changed();
            }
            PlatformEvent::Background => self.visible = false,
            PlatformEvent::Resize { width, height } => {
                self.size = (width, height);
                if let Some(state) = &mut self.state {
                    state.set_viewport(0, 0, width as i32, height as i32);
                }
                if height > 0 {
                    self.camera.set_aspect(width as f32 / height as f32);
                }
                self.gui.mark_changed();
            }
            PlatformEvent::Touch(touch) => {
                let consumed = self.gui.handle_touch(&touch, &mut self.gui_events);
                if !consumed && let Some(orbit) = &mut self.orbit {
                    orbit.handle_touch(&touch);
                }
            }
            PlatformEvent::Quit => {
                info!("quit requested after {} frames", self.frames);
                self.running = false;
            }
        }
        self.dispatcher.dispatch(&Event::from(event));
    }

    /// Creates a context, or replaces the current one after the platform lost it.
    fn attach_context(&mut self) {
        let ctx = match self.provider.create_context() {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("failed to acquire a graphics context: {e}");
                return;
            }
        };
        match &mut self.state {
            Some(state) => {
                warn!("graphics context replaced, resetting cached state");
                state.set_context(ctx);
            }
            None => {
                let mut state = GraphicsState::new(ctx);
                state.set_check_errors(self.config.check_errors);
                info!("graphics context ready: {}", state.gl_version());
                self.state = Some(state);
            }
        }
        if let Some(state) = &mut self.state {
            let (w, h) = self.size;
            state.set_viewport(0, 0, w as i32, h as i32);
        }
        self.renderer.invalidate();
        self.gui.mark_changed();
    }

    /// Releases every GPU resource and drops the context.
    pub fn shutdown(&mut self) {
        if let Some(mut state) = self.state.take() {
            self.scene.dispose(&mut state);
            self.gui.dispose(&mut state);
            self.renderer.shaders_mut().dispose(&mut state);
            debug!("shutdown stats: {:?}", state.stats());
        }
        self.visible = false;
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("title", &self.config.title)
            .field("visible", &self.visible)
            .field("running", &self.running)
            .field("frames", &self.frames)
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}
