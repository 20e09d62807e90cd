//! Lifecycle and input bridge between the platform and the render thread.
//!
//! The platform side (a `winit` event loop, or a mobile activity callback)
//! owns a [`PlatformSender`] and posts [`PlatformEvent`]s; the render thread
//! owns the [`LifecycleBridge`] and drains it at the start of each frame.
//! Nothing here touches the graphics context.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use log::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::AppConfig;
use crate::events::{Event, TouchEvent, TouchPhase};

/// Events the platform posts to the render thread.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlatformEvent {
    Alive,
    Foreground,
    Background,
    Resize { width: u32, height: u32 },
    Touch(TouchEvent),
    Quit,
}

impl From<PlatformEvent> for Event {
    fn from(e: PlatformEvent) -> Self {
        match e {
            PlatformEvent::Alive => Event::Alive,
            PlatformEvent::Foreground => Event::Foreground,
            PlatformEvent::Background => Event::Background,
            PlatformEvent::Resize { width, height } => Event::Resize { width, height },
            PlatformEvent::Touch(t) => Event::Touch(t),
            PlatformEvent::Quit => Event::Quit,
        }
    }
}

/// Creates a connected sender/receiver pair.
pub fn bridge() -> (PlatformSender, LifecycleBridge) {
    let (tx, rx) = channel::unbounded();
    (PlatformSender { tx }, LifecycleBridge { rx })
}

/// Platform-side handle; cheap to clone and `Send`.
#[derive(Clone, Debug)]
pub struct PlatformSender {
    tx: Sender<PlatformEvent>,
}

impl PlatformSender {
    /// Posts an event. Returns `false` if the render side is gone.
    pub fn send(&self, event: PlatformEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to post {:?}: render side disconnected", e.0);
                false
            }
        }
    }
}

/// Render-side end of the bridge.
#[derive(Debug)]
pub struct LifecycleBridge {
    rx: Receiver<PlatformEvent>,
}

impl LifecycleBridge {
    /// Moves every pending event into `out`, oldest first. Returns how many were moved.
    pub fn drain_into(&self, out: &mut Vec<PlatformEvent>) -> usize {
        let before = out.len();
        loop {
            match self.rx.try_recv() {
                Ok(e) => out.push(e),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if out.len() == before {
                        warn!("platform sender disconnected");
                    }
                    break;
                }
            }
        }
        out.len() - before
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn is_disconnected(&self) -> bool {
        self.rx.is_empty() && self.rx.try_recv() == Err(TryRecvError::Disconnected)
    }
}

/// Maps a native touch phase; cancelled touches end the contact.
pub fn touch_phase(phase: winit::event::TouchPhase) -> TouchPhase {
    match phase {
        winit::event::TouchPhase::Started => TouchPhase::Begin,
        winit::event::TouchPhase::Moved => TouchPhase::Move,
        winit::event::TouchPhase::Ended | winit::event::TouchPhase::Cancelled => TouchPhase::End,
    }
}

/// Turns a left-button mouse drag into a single synthetic touch, so desktop
/// builds exercise the same input path as phones.
#[derive(Clone, Copy, Debug, Default)]
pub struct MouseTouch {
    pressed: bool,
    x: f32,
    y: f32,
}

impl MouseTouch {
    /// Sequence number used for mouse-generated touches.
    pub const SEQUENCE: u64 = u64::MAX;

    pub fn moved(&mut self, x: f32, y: f32) -> Option<TouchEvent> {
        self.x = x;
        self.y = y;
        self.pressed.then(|| self.touch(TouchPhase::Move))
    }

    pub fn button(&mut self, pressed: bool) -> Option<TouchEvent> {
        if pressed == self.pressed {
            return None;
        }
        self.pressed = pressed;
        Some(self.touch(if pressed { TouchPhase::Begin } else { TouchPhase::End }))
    }

    fn touch(&self, phase: TouchPhase) -> TouchEvent {
        TouchEvent {
            x: self.x,
            y: self.y,
            sequence: Self::SEQUENCE,
            phase,
        }
    }
}

/// Translates a window event. `CloseRequested` becomes [`PlatformEvent::Quit`].
pub fn translate_window_event(event: &WindowEvent, mouse: &mut MouseTouch) -> Option<PlatformEvent> {
    match event {
        WindowEvent::CloseRequested | WindowEvent::Destroyed => Some(PlatformEvent::Quit),
        WindowEvent::Resized(size) => Some(PlatformEvent::Resize {
            width: size.width,
            height: size.height,
        }),
        WindowEvent::Touch(t) => Some(PlatformEvent::Touch(TouchEvent {
            x: t.location.x as f32,
            y: t.location.y as f32,
            sequence: t.id,
            phase: touch_phase(t.phase),
        })),
        WindowEvent::CursorMoved { position, .. } => mouse
            .moved(position.x as f32, position.y as f32)
            .map(PlatformEvent::Touch),
        WindowEvent::MouseInput {
            state,
            button: MouseButton::Left,
            ..
        } => mouse
            .button(*state == ElementState::Pressed)
            .map(PlatformEvent::Touch),
        _ => None,
    }
}

/// Called on every redraw with the window; return `false` to stop requesting frames.
pub type RedrawHook = Box<dyn FnMut(&Window) -> bool>;

/// A `winit` application handler that forwards lifecycle and input events.
pub struct WinitBridge {
    sender: PlatformSender,
    title: String,
    width: u32,
    height: u32,
    window: Option<Arc<Window>>,
    mouse: MouseTouch,
    on_redraw: Option<RedrawHook>,
}

impl WinitBridge {
    pub fn new(config: &AppConfig, sender: PlatformSender) -> Self {
        Self {
            sender,
            title: config.title.clone(),
            width: config.width,
            height: config.height,
            window: None,
            mouse: MouseTouch::default(),
            on_redraw: None,
        }
    }

    /// Installs the per-redraw callback, usually driving `Application::run_frame`.
    pub fn on_redraw(mut self, hook: impl FnMut(&Window) -> bool + 'static) -> Self {
        self.on_redraw = Some(Box::new(hook));
        self
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        self.window.as_ref()
    }

    /// Runs the event loop until the window closes.
    pub fn run(mut self) -> Result<(), winit::error::EventLoopError> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)
    }
}

impl ApplicationHandler for WinitBridge {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let attrs = WindowAttributes::default()
                .with_title(&self.title)
                .with_inner_size(LogicalSize::new(self.width, self.height));
            match event_loop.create_window(attrs) {
                Ok(window) => {
                    info!("window created: {}", self.title);
                    self.window = Some(Arc::new(window));
                }
                Err(e) => {
                    error!("failed to create window: {e}");
                    event_loop.exit();
                    return;
                }
            }
        }
        self.sender.send(PlatformEvent::Alive);
        self.sender.send(PlatformEvent::Foreground);
        if let Some(window) = &self.window {
            let size = window.inner_size();
            self.sender.send(PlatformEvent::Resize {
                width: size.width,
                height: size.height,
            });
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.sender.send(PlatformEvent::Background);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let WindowEvent::RedrawRequested = event {
            if let (Some(window), Some(hook)) = (&self.window, &mut self.on_redraw)
                && hook(window)
            {
                window.request_redraw();
            }
            return;
        }

        if let Some(translated) = translate_window_event(&event, &mut self.mouse) {
            let quit = translated == PlatformEvent::Quit;
            self.sender.send(translated);
            if quit {
                event_loop.exit();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn events_cross_threads_in_order() {
        let (tx, rx) = bridge();
        let handle = std::thread::spawn(move || {
            tx.send(PlatformEvent::Alive);
            tx.send(PlatformEvent::Resize { width: 10, height: 20 });
        });
        handle.join().unwrap();

        let mut out = Vec::new();
        assert_eq!(rx.drain_into(&mut out), 2);
        assert_eq!(out[0], PlatformEvent::Alive);
        assert_eq!(out[1], PlatformEvent::Resize { width: 10, height: 20 });
        assert!(rx.is_disconnected());
    }

    #[test]
    fn send_fails_without_receiver() {
        let (tx, rx) = bridge();
        drop(rx);
        assert!(!tx.send(PlatformEvent::Quit));
    }

    #[test]
    fn mouse_drag_becomes_touch() {
        let mut mouse = MouseTouch::default();
        assert_eq!(mouse.moved(5.0, 5.0), None);
        let begin = mouse.button(true).unwrap();
        assert_eq!(begin.phase, TouchPhase::Begin);
        assert_eq!((begin.x, begin.y), (5.0, 5.0));
        assert_eq!(mouse.button(true), None);
        assert_eq!(mouse.moved(6.0, 7.0).map(|t| t.phase), Some(TouchPhase::Move));
        assert_eq!(mouse.button(false).map(|t| t.phase), Some(TouchPhase::End));
    }

    #[test]
    fn window_events_translate() {
        let mut mouse = MouseTouch::default();
        assert_eq!(
            translate_window_event(&WindowEvent::Resized(PhysicalSize::new(750, 1334)), &mut mouse),
            Some(PlatformEvent::Resize { width: 750, height: 1334 })
        );
        assert_eq!(
            translate_window_event(&WindowEvent::CloseRequested, &mut mouse),
            Some(PlatformEvent::Quit)
        );
        assert_eq!(
            translate_window_event(&WindowEvent::Focused(true), &mut mouse),
            None
        );
        assert_eq!(touch_phase(winit::event::TouchPhase::Cancelled), TouchPhase::End);
    }

    #[test]
    fn platform_events_map_to_app_events() {
        assert_eq!(Event::from(PlatformEvent::Background), Event::Background);
        assert_eq!(
            Event::from(PlatformEvent::Resize { width: 1, height: 2 }),
            Event::Resize { width: 1, height: 2 }
        );
    }
}
