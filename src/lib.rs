//! # gles3d
//!
//! **A state-caching OpenGL ES scene-graph renderer for mobile 3D apps.**
//!
//! Build a [`Scene`] of nodes, attach [`Graphic`]s and [`Light`]s, and let the
//! [`Renderer`] draw it through a [`GraphicsState`](gls::GraphicsState) that
//! drops every redundant state change before it reaches the driver.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use gles3d::*;
//! use gles3d::gls::{GraphicsState, HeadlessContext};
//!
//! let mut gs = GraphicsState::new(Box::new(HeadlessContext::new()));
//! gs.set_viewport(0, 0, 750, 1334);
//!
//! let mut scene = Scene::new();
//! let node = scene.create_node("cube");
//! scene.add_graphic(Graphic::mesh(
//!     node,
//!     Arc::new(Geometry::cube(1.0)),
//!     Material::standard(Color::RED),
//! ));
//! let sun = scene.create_node("sun");
//! scene.add_light(sun, Light::directional(Color::WHITE, 1.0));
//!
//! let camera = Camera::new().at(Vec3::new(0.0, 2.0, 6.0)).looking_at(Vec3::ZERO);
//! let mut renderer = Renderer::new();
//! let report = renderer.render(&mut gs, &mut scene, &camera, None).unwrap();
//! assert!(report.rendered);
//! assert_eq!(report.stats.draw_calls, 1);
//! ```
//!
//! ## Layout
//!
//! - [`gls`]: the context boundary, the state cache and its [`Stats`](gls::Stats).
//! - [`scene`]: node hierarchy and the [`Scene`] container.
//! - [`Geometry`], [`Material`], [`Texture2D`] and [`Graphic`]: what gets drawn.
//! - [`Renderer`]: the per-frame state machine.
//! - [`Application`]: lifecycle, events and frame pacing around all of the above.

mod app;
mod camera;
mod color;
mod config;
mod culling;
mod error;
mod events;
mod geometry;
pub mod gls;
mod graphic;
mod gui;
mod light;
mod logging;
mod material;
mod orbit_control;
mod picking;
mod platform;
mod renderer;
pub mod scene;
pub mod shaders;
mod texture;
mod time;

pub use app::{Application, ContextProvider, Presenter};
pub use camera::{Camera, Projection};
pub use color::Color;
pub use config::AppConfig;
pub use culling::Frustum;
pub use error::{RenderError, Result};
pub use events::{Dispatcher, Event, EventKind, SubscriptionId, TouchEvent, TouchPhase};
pub use geometry::{BONE_INFLUENCERS, Geometry, SkinVertex, Vertex};
pub use graphic::{
    Graphic, GraphicId, GraphicKind, MaterialGroup, RenderInfo, Renderable, RiggedMesh, Skeleton,
};
pub use gui::{GuiEvent, GuiRoot, Panel, PanelId, Rect};
pub use light::{Light, LightSet, MAX_DIR_LIGHTS, MAX_POINT_LIGHTS};
pub use logging::{LoggingConfig, init_logging};
pub use material::{Blending, Material, MaterialKind, Side};
pub use orbit_control::{OrbitControl, OrbitMode};
pub use picking::{Intersect, Ray, Raycaster, sort_intersects};
pub use platform::{
    LifecycleBridge, MouseTouch, PlatformEvent, PlatformSender, RedrawHook, WinitBridge, bridge,
    touch_phase, translate_window_event,
};
pub use renderer::{FrameReport, RenderStage, RenderStats, Renderer};
pub use scene::{LightId, NodeId, NodeTree, Scene, Transform};
pub use shaders::{ShaderDefines, ShaderManager};
pub use texture::Texture2D;
pub use time::{FrameClock, FrameRater, FrameTime};

// Re-export glam math types for convenience
pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
